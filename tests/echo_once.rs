//! A client connects, sends one message, and the accepted peer receives it.

mod util;

use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use corio::{ExecutionContext, TcpAcceptor, TcpStream};

#[test]
fn echo_once() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let acceptor = TcpAcceptor::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = acceptor.local_addr().unwrap();

    // Keeps the accepted stream alive for the duration of its recv.
    let accepted: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));
    let (recv_tx, recv_rx) = mpsc::channel();
    let accepted_for_accept = accepted.clone();
    acceptor.async_accept(move |res| {
        let stream = res.unwrap();
        let tx = recv_tx.clone();
        stream.async_recv(vec![0u8; 5], move |res, buf| {
            let n = res.unwrap();
            assert_eq!(&buf[..n], b"hello");
            tx.send(()).unwrap();
        });
        *accepted_for_accept.lock().unwrap() = Some(stream);
    });

    let (connect_tx, connect_rx) = mpsc::channel();
    let client = TcpStream::async_connect(&ctx, addr, move |res| {
        res.unwrap();
        connect_tx.send(()).unwrap();
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while connect_rx.try_recv().is_err() && Instant::now() < deadline {
        ctx.run_one().unwrap();
    }
    connect_rx.try_recv().expect("echo_once: connect never completed");

    client.send(b"hello").unwrap();

    while recv_rx.try_recv().is_err() && Instant::now() < deadline {
        ctx.run_one().unwrap();
    }
    recv_rx.try_recv().expect("echo_once: recv completion never arrived");
}
