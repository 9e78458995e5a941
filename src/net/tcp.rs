//! TCP stream and acceptor.
//!
//! Grounded on the teacher crate's `net::tcp::stream`/`net::tcp::listener`
//! (nonblocking `socket2::Socket` plus manual connect/accept retry) and on
//! the original source's `reactive_socket_service`/`reactive_socket_accept_op`
//! for the asynchronous state machine itself.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::buffer::{recv_views, send_views, total_len};
use crate::context::{ExecutionContext, Handler};
use crate::error::{Error, ErrorKind, Result};
use crate::reactor::{BoxedOp, Direction, ReactorOp};
use crate::socket::{is_connection_aborted, is_in_progress, is_would_block, SocketImpl};

/// A connected TCP socket.
pub struct TcpStream {
    inner: SocketImpl,
}

impl TcpStream {
    /// Open a socket and begin connecting to `addr` asynchronously. `on_connect`
    /// runs once the connection succeeds or fails; it never runs inline.
    pub fn async_connect<F>(ctx: &ExecutionContext, addr: SocketAddr, on_connect: F) -> Result<TcpStream>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        let inner = SocketImpl::from_socket2(ctx, socket)?;
        let stream = TcpStream { inner };
        stream.start_connect(addr, Box::new(on_connect))?;
        Ok(stream)
    }

    fn start_connect(&self, addr: SocketAddr, on_connect: Box<dyn FnOnce(Result<()>) + Send>) -> Result<()> {
        match self.inner.socket().connect(&addr.into()) {
            Ok(()) => {
                self.inner.ctx().post(move || on_connect(Ok(())));
                return Ok(());
            }
            Err(e) if is_in_progress(&e) => {}
            Err(e) => {
                self.inner.ctx().post(move || on_connect(Err(e.into())));
                return Ok(());
            }
        }

        let op: BoxedOp = Box::new(ConnectOp {
            socket: self.inner.handle(),
            first: true,
            callback: Some(on_connect),
        });
        self.inner.start_op(Direction::Write, op);
        Ok(())
    }

    /// Open a socket and connect to `addr`, blocking the calling thread (not
    /// the context's other workers) until the connection completes.
    pub fn connect(ctx: &ExecutionContext, addr: SocketAddr) -> Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        let inner = SocketImpl::from_socket2(ctx, socket)?;
        match inner.socket().connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if is_in_progress(&e) => {
                inner.sync_op(true, || match inner.socket().take_error()? {
                    None => Ok(()),
                    Some(e) => Err(e),
                })?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(TcpStream { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.ensure_open()?;
        self.inner.local_addr()
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.ensure_open()?;
        self.inner.peer_addr()
    }

    pub fn set_linger(&self, linger: Option<Duration>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.set_linger(linger)
    }

    /// Queue an asynchronous send of the full contents of `buf`. `on_sent`
    /// receives the byte count and `buf` back (so it can be reused) once the
    /// whole buffer has been written or the socket errors.
    pub fn async_send<F>(&self, buf: Vec<u8>, on_sent: F)
    where
        F: FnOnce(Result<usize>, Vec<u8>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_sent(Err(e), buf));
            return;
        }
        let op: BoxedOp = Box::new(SendOp {
            socket: self.inner.handle(),
            buf,
            written: 0,
            callback: Some(Box::new(on_sent)),
        });
        self.inner.start_op(Direction::Write, op);
    }

    /// Queue an asynchronous receive into `buf` (must be non-empty). `on_recv`
    /// receives the byte count and `buf` back. A clean peer close is
    /// reported as `ErrorKind::Eof`.
    pub fn async_recv<F>(&self, buf: Vec<u8>, on_recv: F)
    where
        F: FnOnce(Result<usize>, Vec<u8>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_recv(Err(e), buf));
            return;
        }
        let op: BoxedOp = Box::new(RecvOp {
            socket: self.inner.handle(),
            buf,
            callback: Some(Box::new(on_recv)),
        });
        self.inner.start_op(Direction::Read, op);
    }

    /// Queue an asynchronous scatter/gather send of every buffer in `bufs`,
    /// in order, as a single logical write. `on_sent` receives the total
    /// byte count and `bufs` back once every buffer has been written or the
    /// socket errors. Grounded on `spec.md` §4.4's IOV_MAX-bounded scatter/
    /// gather limit, enforced by [`crate::buffer`].
    pub fn async_send_vectored<F>(&self, bufs: Vec<Vec<u8>>, on_sent: F)
    where
        F: FnOnce(Result<usize>, Vec<Vec<u8>>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_sent(Err(e), bufs));
            return;
        }
        let op: BoxedOp = Box::new(VectoredSendOp {
            socket: self.inner.handle(),
            bufs,
            written: 0,
            callback: Some(Box::new(on_sent)),
        });
        self.inner.start_op(Direction::Write, op);
    }

    /// Queue an asynchronous scatter receive into `bufs`. Completes after
    /// the first successful read, which may only partially fill the
    /// sequence — the same "return what arrived" semantics as
    /// [`TcpStream::async_recv`].
    pub fn async_recv_vectored<F>(&self, bufs: Vec<Vec<u8>>, on_recv: F)
    where
        F: FnOnce(Result<usize>, Vec<Vec<u8>>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_recv(Err(e), bufs));
            return;
        }
        let op: BoxedOp = Box::new(VectoredRecvOp {
            socket: self.inner.handle(),
            bufs,
            callback: Some(Box::new(on_recv)),
        });
        self.inner.start_op(Direction::Read, op);
    }

    /// Blocking scatter/gather send of every buffer in `bufs`.
    pub fn send_vectored(&self, bufs: &[Vec<u8>]) -> Result<usize> {
        self.inner.ensure_open()?;
        let total = total_len(bufs);
        let mut written = 0;
        while written < total {
            let views = send_views(bufs, written);
            written += self
                .inner
                .sync_op(true, || (&*self.inner.socket()).write_vectored(&views))?;
        }
        Ok(written)
    }

    /// Blocking scatter receive into `bufs`. Returns `Err(ErrorKind::Eof)`
    /// on clean peer close.
    pub fn recv_vectored(&self, bufs: &mut [Vec<u8>]) -> Result<usize> {
        self.inner.ensure_open()?;
        let n = self.inner.sync_op(false, || {
            let mut views = recv_views(bufs, 0);
            (&*self.inner.socket()).read_vectored(&mut views)
        })?;
        if n == 0 {
            Err(Error::new(ErrorKind::Eof))
        } else {
            Ok(n)
        }
    }

    /// Blocking send of the entire buffer.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.inner.ensure_open()?;
        let mut written = 0;
        while written < buf.len() {
            written += self.inner.sync_op(true, || (&*self.inner.socket()).write(&buf[written..]))?;
        }
        Ok(written)
    }

    /// Blocking receive. Returns `Err(ErrorKind::Eof)` on clean peer close.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.ensure_open()?;
        let n = self.inner.sync_op(false, || (&*self.inner.socket()).read(buf))?;
        if n == 0 {
            Err(Error::new(ErrorKind::Eof))
        } else {
            Ok(n)
        }
    }

    /// Cancel every pending asynchronous operation on this stream.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Explicitly close the stream: cancels every pending operation and
    /// deregisters it from the reactor. Every subsequent call on this
    /// `TcpStream` fails with `ErrorKind::BadDescriptor`, including a
    /// second `close()`.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// A listening TCP socket.
pub struct TcpAcceptor {
    inner: SocketImpl,
}

impl TcpAcceptor {
    pub fn bind(ctx: &ExecutionContext, addr: SocketAddr) -> Result<TcpAcceptor> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        let mut inner = SocketImpl::from_socket2(ctx, socket)?;
        inner.set_reuse_address(true)?;
        inner.socket().bind(&addr.into())?;
        inner.socket().listen(1024)?;
        inner.set_enable_connection_aborted(false);
        Ok(TcpAcceptor { inner })
    }

    /// Whether an aborted incoming connection (`ECONNABORTED`/`EPROTO`) is
    /// surfaced to `on_accept` as `ErrorKind::ConnectionAborted` instead of
    /// being silently retried. Default `false`.
    pub fn set_enable_connection_aborted(&mut self, enabled: bool) {
        self.inner.set_enable_connection_aborted(enabled);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.ensure_open()?;
        self.inner.local_addr()
    }

    pub fn async_accept<F>(&self, on_accept: F)
    where
        F: FnOnce(Result<TcpStream>) + Send + 'static,
    {
        if let Err(e) = self.inner.ensure_open() {
            self.inner.ctx().post(move || on_accept(Err(e)));
            return;
        }
        let op: BoxedOp = Box::new(AcceptOp {
            ctx: self.inner.ctx().clone(),
            socket: self.inner.handle(),
            swallow_aborted: !self.inner.enable_connection_aborted(),
            callback: Some(Box::new(on_accept)),
        });
        self.inner.start_op(Direction::Read, op);
    }

    pub fn accept(&self) -> Result<TcpStream> {
        self.inner.ensure_open()?;
        let swallow_aborted = !self.inner.enable_connection_aborted();
        let (socket, _addr) = self.inner.sync_op(false, || loop {
            match self.inner.socket().accept() {
                Ok(pair) => return Ok(pair),
                Err(e) if is_connection_aborted(&e) && swallow_aborted => continue,
                Err(e) => return Err(e),
            }
        })?;
        let inner = SocketImpl::from_socket2(self.inner.ctx(), socket)?;
        Ok(TcpStream { inner })
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Explicitly close the acceptor: cancels every pending `async_accept`
    /// and deregisters it from the reactor. Every subsequent call on this
    /// `TcpAcceptor` fails with `ErrorKind::BadDescriptor`, including a
    /// second `close()`.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

struct ConnectOp {
    socket: Arc<Socket>,
    /// The synchronous attempt `start_op` makes before enqueuing can't yet
    /// know the connection's outcome — writability hasn't been observed —
    /// so the first `perform` always defers.
    first: bool,
    callback: Option<Box<dyn FnOnce(Result<()>) + Send>>,
}

impl ReactorOp for ConnectOp {
    fn perform(&mut self) -> Option<Handler> {
        if self.first {
            self.first = false;
            return None;
        }
        let result = match self.socket.take_error() {
            Ok(None) => Ok(()),
            Ok(Some(e)) => Err(Error::from(e)),
            Err(e) => Err(Error::from(e)),
        };
        let cb = self.callback.take().unwrap();
        Some(Box::new(move || cb(result)))
    }

    fn cancel(self: Box<Self>) -> Handler {
        let cb = self.callback.unwrap();
        Box::new(move || cb(Err(Error::operation_aborted())))
    }
}

struct AcceptOp {
    ctx: ExecutionContext,
    socket: Arc<Socket>,
    swallow_aborted: bool,
    callback: Option<Box<dyn FnOnce(Result<TcpStream>) + Send>>,
}

impl ReactorOp for AcceptOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            match self.socket.accept() {
                Ok((sock, _addr)) => {
                    let cb = self.callback.take().unwrap();
                    let ctx = self.ctx.clone();
                    return Some(Box::new(move || {
                        cb(SocketImpl::from_socket2(&ctx, sock).map(|inner| TcpStream { inner }));
                    }));
                }
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_connection_aborted(&e) && self.swallow_aborted => continue,
                Err(e) => {
                    let cb = self.callback.take().unwrap();
                    let err = Error::from(e);
                    return Some(Box::new(move || cb(Err(err))));
                }
            }
        }
    }

    fn cancel(self: Box<Self>) -> Handler {
        let cb = self.callback.unwrap();
        Box::new(move || cb(Err(Error::operation_aborted())))
    }
}

struct SendOp {
    socket: Arc<Socket>,
    buf: Vec<u8>,
    written: usize,
    callback: Option<Box<dyn FnOnce(Result<usize>, Vec<u8>) + Send>>,
}

impl ReactorOp for SendOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            if self.written >= self.buf.len() {
                let cb = self.callback.take().unwrap();
                let buf = std::mem::take(&mut self.buf);
                let total = self.written;
                return Some(Box::new(move || cb(Ok(total), buf)));
            }
            match (&*self.socket).write(&self.buf[self.written..]) {
                Ok(n) => self.written += n,
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
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

struct RecvOp {
    socket: Arc<Socket>,
    buf: Vec<u8>,
    callback: Option<Box<dyn FnOnce(Result<usize>, Vec<u8>) + Send>>,
}

impl ReactorOp for RecvOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            match (&*self.socket).read(&mut self.buf[..]) {
                Ok(0) => {
                    let cb = self.callback.take().unwrap();
                    let buf = std::mem::take(&mut self.buf);
                    return Some(Box::new(move || cb(Err(Error::new(ErrorKind::Eof)), buf)));
                }
                Ok(n) => {
                    let cb = self.callback.take().unwrap();
                    let buf = std::mem::take(&mut self.buf);
                    return Some(Box::new(move || cb(Ok(n), buf)));
                }
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
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

struct VectoredSendOp {
    socket: Arc<Socket>,
    bufs: Vec<Vec<u8>>,
    written: usize,
    callback: Option<Box<dyn FnOnce(Result<usize>, Vec<Vec<u8>>) + Send>>,
}

impl ReactorOp for VectoredSendOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            let total = total_len(&self.bufs);
            if self.written >= total {
                let cb = self.callback.take().unwrap();
                let bufs = std::mem::take(&mut self.bufs);
                let written = self.written;
                return Some(Box::new(move || cb(Ok(written), bufs)));
            }
            let views = send_views(&self.bufs, self.written);
            match (&*self.socket).write_vectored(&views) {
                Ok(n) => self.written += n,
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let cb = self.callback.take().unwrap();
                    let bufs = std::mem::take(&mut self.bufs);
                    let err = Error::from(e);
                    return Some(Box::new(move || cb(Err(err), bufs)));
                }
            }
        }
    }

    fn cancel(self: Box<Self>) -> Handler {
        let cb = self.callback.unwrap();
        let bufs = self.bufs;
        Box::new(move || cb(Err(Error::operation_aborted()), bufs))
    }
}

struct VectoredRecvOp {
    socket: Arc<Socket>,
    bufs: Vec<Vec<u8>>,
    callback: Option<Box<dyn FnOnce(Result<usize>, Vec<Vec<u8>>) + Send>>,
}

impl ReactorOp for VectoredRecvOp {
    fn perform(&mut self) -> Option<Handler> {
        loop {
            let mut views = recv_views(&mut self.bufs, 0);
            match (&*self.socket).read_vectored(&mut views) {
                Ok(0) => {
                    let cb = self.callback.take().unwrap();
                    let bufs = std::mem::take(&mut self.bufs);
                    return Some(Box::new(move || cb(Err(Error::new(ErrorKind::Eof)), bufs)));
                }
                Ok(n) => {
                    let cb = self.callback.take().unwrap();
                    let bufs = std::mem::take(&mut self.bufs);
                    return Some(Box::new(move || cb(Ok(n), bufs)));
                }
                Err(e) if is_would_block(&e) => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let cb = self.callback.take().unwrap();
                    let bufs = std::mem::take(&mut self.bufs);
                    let err = Error::from(e);
                    return Some(Box::new(move || cb(Err(err), bufs)));
                }
            }
        }
    }

    fn cancel(self: Box<Self>) -> Handler {
        let cb = self.callback.unwrap();
        let bufs = self.bufs;
        Box::new(move || cb(Err(Error::operation_aborted()), bufs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionContext;

    // The echo-once end-to-end scenario lives in `tests/echo_once.rs`.

    #[test]
    fn vectored_send_reassembles_on_the_blocking_path() {
        let ctx = ExecutionContext::new().unwrap();
        let acceptor = TcpAcceptor::bind(&ctx, "127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = acceptor.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let stream = acceptor.accept().unwrap();
            let mut bufs = vec![vec![0u8; 3], vec![0u8; 3], vec![0u8; 4]];
            let n = stream.recv_vectored(&mut bufs).unwrap();
            (n, bufs)
        });

        let client = TcpStream::connect(&ctx, addr).unwrap();
        let bufs = vec![b"abc".to_vec(), b"def".to_vec(), b"ghij".to_vec()];
        let n = client.send_vectored(&bufs).unwrap();
        assert_eq!(n, 10);
        drop(client);

        // A single small writev lands in one recv on loopback, same
        // assumption echo_once makes about a single `send`/`recv` pair.
        let (n, received) = server.join().unwrap();
        assert_eq!(n, 10);
        assert_eq!(received.concat(), b"abcdefghij");
    }
}
