//! Closing a socket with a pending asynchronous operation delivers that
//! operation's completion with `ErrorKind::OperationAborted` instead of
//! leaving it to hang forever.

mod util;

use std::sync::mpsc;

use corio::{ErrorKind, ExecutionContext, TcpAcceptor, TcpStream};

#[test]
fn cancellation_by_close() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    // The kernel completes the handshake into the listen backlog without
    // any `accept()` call on our side, so the client's connect succeeds and
    // nothing ever arrives for its pending recv below.
    let acceptor = TcpAcceptor::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let client = TcpStream::connect(&ctx, addr).unwrap();

    let (tx, rx) = mpsc::channel();
    client.async_recv(vec![0u8; 16], move |res, _buf| {
        tx.send(res).unwrap();
    });

    drop(client);
    ctx.run_one().unwrap();

    let res = rx.try_recv().expect("recv completion never arrived after close");
    let err = res.expect_err("closed socket's pending recv must complete with an error");
    assert_eq!(err.kind(), ErrorKind::OperationAborted);
}
