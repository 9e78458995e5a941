//! Connecting to a port nothing is listening on completes with an error
//! instead of hanging, on both the blocking and asynchronous paths.

mod util;

use std::sync::mpsc;
use std::time::{Duration, Instant};

use corio::{ExecutionContext, TcpAcceptor, TcpStream};

/// Bind a listener, read its address, then drop it immediately so the port
/// is guaranteed to be refusing connections (rather than guessing at an
/// unused port number).
fn closed_port() -> std::net::SocketAddr {
    let ctx = ExecutionContext::new().unwrap();
    let acceptor = TcpAcceptor::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = acceptor.local_addr().unwrap();
    drop(acceptor);
    addr
}

#[test]
fn connect_to_closed_port_blocking() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let addr = closed_port();
    let err = TcpStream::connect(&ctx, addr).expect_err("connect to a closed port must fail");
    assert_eq!(err.kind(), corio::ErrorKind::Os);
}

#[test]
fn connect_to_closed_port_async() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let addr = closed_port();

    let (tx, rx) = mpsc::channel();
    let _stream = TcpStream::async_connect(&ctx, addr, move |res| {
        tx.send(res).unwrap();
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while rx.try_recv().is_err() && Instant::now() < deadline {
        ctx.run_one().unwrap();
    }
    let res = rx.try_recv().expect("connect completion never arrived");
    assert!(res.is_err(), "connect to a closed port must fail");
}
