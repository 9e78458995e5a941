//! UDP datagram socket.
//!
//! Grounded the same way as `tcp.rs`: `socket2::Socket` for the descriptor,
//! the reactor's read/write operation queues for the asynchronous path.

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::context::{ExecutionContext, Handler};
use crate::error::{Error, Result};
use crate::reactor::{BoxedOp, Direction, ReactorOp};
use crate::socket::{as_uninit, is_would_block, SocketImpl};

pub struct UdpSocket {
    inner: SocketImpl,
}

impl UdpSocket {
    pub fn bind(ctx: &ExecutionContext, addr: SocketAddr) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
        socket.bind(&addr.into())?;
        let inner = SocketImpl::from_socket2(ctx, socket)?;
        Ok(UdpSocket { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.ensure_open()?;
        self.inner.local_addr()
    }

    pub fn async_send_to<F>(&self, buf: Vec<u8>, target: SocketAddr, on_sent: F)
    where
        F: FnOnce(Result<usize>, Vec<u8>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_sent(Err(e), buf));
            return;
        }
        let op: BoxedOp = Box::new(SendToOp {
            socket: self.inner.handle(),
            buf,
            target: target.into(),
            callback: Some(Box::new(on_sent)),
        });
        self.inner.start_op(Direction::Write, op);
    }

    pub fn async_recv_from<F>(&self, buf: Vec<u8>, on_recv: F)
    where
        F: FnOnce(Result<(usize, SocketAddr)>, Vec<u8>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_recv(Err(e), buf));
            return;
        }
        let op: BoxedOp = Box::new(RecvFromOp {
            socket: self.inner.handle(),
            buf,
            callback: Some(Box::new(on_recv)),
        });
        self.inner.start_op(Direction::Read, op);
    }

    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        self.inner.ensure_open()?;
        let dest: SockAddr = target.into();
        self.inner.sync_op(true, || self.inner.socket().send_to(buf, &dest))
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.inner.ensure_open()?;
        self.inner.sync_op(false, || {
            let (n, from) = self.inner.socket().recv_from(as_uninit(buf))?;
            let addr = from
                .as_socket()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
            Ok((n, addr))
        })
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Explicitly close the socket: cancels every pending operation and
    /// deregisters it from the reactor. Every subsequent call on this
    /// `UdpSocket` fails with `ErrorKind::BadDescriptor`, including a second
    /// `close()`.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

struct SendToOp {
    socket: Arc<Socket>,
    buf: Vec<u8>,
    target: SockAddr,
    callback: Option<Box<dyn FnOnce(Result<usize>, Vec<u8>) + Send>>,
}

impl ReactorOp for SendToOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            match self.socket.send_to(&self.buf, &self.target) {
                Ok(n) => {
                    let cb = self.callback.take().unwrap();
                    let buf = std::mem::take(&mut self.buf);
                    return Some(Box::new(move || cb(Ok(n), buf)));
                }
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let cb = self.callback.take().unwrap();
                    let buf = std::mem::take(&mut self.buf);
                    let err = Error::from(e);
                    return Some(Box::new(move || cb(Err(err), buf)));
                }
            }
        }
    }

    fn cancel(self: Box<Self>) -> Handler {
        let cb = self.callback.unwrap();
        let buf = self.buf;
        Box::new(move || cb(Err(Error::operation_aborted()), buf))
    }
}

struct RecvFromOp {
    socket: Arc<Socket>,
    buf: Vec<u8>,
    callback: Option<Box<dyn FnOnce(Result<(usize, SocketAddr)>, Vec<u8>) + Send>>,
}

impl ReactorOp for RecvFromOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            match self.socket.recv_from(as_uninit(&mut self.buf)) {
                Ok((n, from)) => {
                    let cb = self.callback.take().unwrap();
                    let buf = std::mem::take(&mut self.buf);
                    let result = match from.as_socket() {
                        Some(addr) => Ok((n, addr)),
                        None => Err(Error::new(crate::error::ErrorKind::InvalidArgument)),
                    };
                    return Some(Box::new(move || cb(result, buf)));
                }
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let cb = self.callback.take().unwrap();
                    let buf = std::mem::take(&mut self.buf);
                    let err = Error::from(e);
                    return Some(Box::new(move || cb(Err(err), buf)));
                }
            }
        }
    }

    fn cancel(self: Box<Self>) -> Handler {
        let cb = self.callback.unwrap();
        let buf = self.buf;
        Box::new(move || cb(Err(Error::operation_aborted()), buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionContext;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[test]
    fn send_to_and_recv_from() {
        let ctx = ExecutionContext::new().unwrap();
        let a = UdpSocket::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
        let b = UdpSocket::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
        let b_addr = b.local_addr().unwrap();

        let (tx, rx) = mpsc::channel();
        b.async_recv_from(vec![0u8; 8], move |res, buf| {
            let (n, _from) = res.unwrap();
            assert_eq!(&buf[..n], b"ping");
            tx.send(()).unwrap();
        });

        a.send_to(b"ping", b_addr).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while rx.try_recv().is_err() && Instant::now() < deadline {
            ctx.run_one().unwrap();
        }
        rx.try_recv().expect("send_to_and_recv_from: recv never arrived");
    }
}
