//! `close()` is an explicit, idempotent socket-service operation: a second
//! `close()` (or any other call) against an already-closed socket fails
//! with `ErrorKind::BadDescriptor` instead of panicking or double-freeing
//! the descriptor.

mod util;

use corio::{ErrorKind, ExecutionContext, TcpAcceptor, TcpStream, UdpSocket};

#[test]
fn tcp_stream_close_then_close_is_bad_descriptor() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let acceptor = TcpAcceptor::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = acceptor.local_addr().unwrap();
    let client = TcpStream::connect(&ctx, addr).unwrap();

    client.close().unwrap();
    let err = client.close().expect_err("second close must fail");
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);

    let err = client.local_addr().expect_err("calls after close must fail");
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
}

#[test]
fn tcp_acceptor_close_then_close_is_bad_descriptor() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let acceptor = TcpAcceptor::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();

    acceptor.close().unwrap();
    let err = acceptor.close().expect_err("second close must fail");
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);

    let err = acceptor.accept().expect_err("accept after close must fail");
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
}

#[test]
fn udp_socket_close_then_close_is_bad_descriptor() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let socket = UdpSocket::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();

    socket.close().unwrap();
    let err = socket.close().expect_err("second close must fail");
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);

    let err = socket
        .send_to(b"x", "127.0.0.1:1".parse().unwrap())
        .expect_err("send_to after close must fail");
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
}
