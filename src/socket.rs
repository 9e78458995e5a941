//! `SocketImpl`: the native-descriptor wrapper shared by every socket type
//! in `net`. Grounded on the original source's `socket_ops`/
//! `reactive_socket_service` (descriptor + per-socket flags) and, for the
//! descriptor itself, on the teacher's own `net::tcp::stream` use of
//! `socket2::Socket` for portable nonblocking-connect and option handling.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::Socket;

use crate::context::{ExecutionContext, Handler};
use crate::error::{Error, ErrorKind, Result};
use crate::reactor::{BoxedOp, Direction};
use crate::sys::RawDescriptor;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(windows)]
use std::os::windows::io::AsRawSocket;

/// One open descriptor registered with a context's reactor.
///
/// `accept_incoming_aborted` mirrors `spec.md`'s `enable_connection_aborted`
/// flag: by default a peer reset observed during `accept` is swallowed and
/// the acceptor silently retries, matching BSD socket historical practice;
/// opting in surfaces it as `ErrorKind::ConnectionAborted` instead.
pub(crate) struct SocketImpl {
    ctx: ExecutionContext,
    socket: Arc<Socket>,
    fd: RawDescriptor,
    accept_incoming_aborted: bool,
    /// Set once by [`SocketImpl::close`]; every operation checks this via
    /// [`SocketImpl::ensure_open`] first so a closed `SocketImpl` fails with
    /// `bad_descriptor` instead of quietly succeeding against a descriptor
    /// the reactor no longer tracks.
    closed: AtomicBool,
    /// Whether the user has ever called `set_linger`, so `close` knows
    /// whether `SO_LINGER` needs resetting before the descriptor goes away
    /// (`spec.md` §4.4's linger-set marker).
    linger_set: AtomicBool,
}

impl SocketImpl {
    pub(crate) fn from_socket2(ctx: &ExecutionContext, socket: Socket) -> Result<SocketImpl> {
        socket.set_nonblocking(true)?;
        let fd = raw_descriptor(&socket);
        ctx.reactor().register_descriptor(fd);
        Ok(SocketImpl {
            ctx: ctx.clone(),
            socket: Arc::new(socket),
            fd,
            accept_incoming_aborted: false,
            closed: AtomicBool::new(false),
            linger_set: AtomicBool::new(false),
        })
    }

    /// Fail with `bad_descriptor` if this socket has already been closed via
    /// [`SocketImpl::close`]. Every operation that would otherwise touch the
    /// descriptor calls this first.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::bad_descriptor())
        } else {
            Ok(())
        }
    }

    pub(crate) fn ctx(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub(crate) fn fd(&self) -> RawDescriptor {
        self.fd
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    /// A cheaply-cloned handle to the underlying descriptor, for an
    /// operation object to perform its own syscalls from inside the
    /// reactor's poll loop without borrowing the owning `SocketImpl`.
    pub(crate) fn handle(&self) -> Arc<Socket> {
        self.socket.clone()
    }

    pub(crate) fn set_enable_connection_aborted(&mut self, enabled: bool) {
        self.accept_incoming_aborted = enabled;
    }

    pub(crate) fn enable_connection_aborted(&self) -> bool {
        self.accept_incoming_aborted
    }

    /// `SO_REUSEADDR`, and on BSD-family platforms `SO_REUSEPORT` alongside
    /// it — `spec.md` §4.4's "BSD SO_REUSEADDR ⇒ SO_REUSEPORT" alias, since
    /// on those platforms `SO_REUSEADDR` alone does not permit rebinding an
    /// in-use port the way it does on Linux.
    pub(crate) fn set_reuse_address(&self, enabled: bool) -> Result<()> {
        self.socket.set_reuse_address(enabled)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        self.socket.set_reuse_port(enabled)?;
        Ok(())
    }

    pub(crate) fn set_linger(&self, linger: Option<Duration>) -> Result<()> {
        self.linger_set.store(true, Ordering::Release);
        self.socket.set_linger(linger).map_err(Error::from)
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument))
    }

    pub(crate) fn peer_addr(&self) -> Result<SocketAddr> {
        self.socket
            .peer_addr()?
            .as_socket()
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument))
    }

    pub(crate) fn take_error(&self) -> Result<Option<Error>> {
        Ok(self.socket.take_error()?.map(Error::from))
    }

    /// Start `op` in `dir`, keeping the context's `run()` from going idle
    /// while it is pending in the reactor. Posts the completion itself if
    /// `op` finishes synchronously inside `start_op`; otherwise the bump
    /// this call applies is released either by `run_impl`'s poll-driven
    /// handoff or by `cancel`/`Drop` below.
    pub(crate) fn start_op(&self, dir: Direction, op: BoxedOp) {
        self.ctx.on_work_started();
        match self.ctx.reactor().start_op(self.fd, dir, op) {
            Ok(Some(handler)) => {
                self.ctx.on_work_finished();
                self.ctx.post_boxed(handler);
            }
            Ok(None) => {}
            Err(_) => self.ctx.on_work_finished(),
        }
    }

    /// Cancel every pending operation without closing the descriptor.
    pub(crate) fn cancel(&self) {
        for h in self.ctx.reactor().cancel_ops(self.fd) {
            self.ctx.on_work_finished();
            self.ctx.post_boxed(h);
        }
    }

    /// Explicit close: cancels every pending operation, deregisters from
    /// the reactor, and marks the descriptor closed so every later call
    /// through this `SocketImpl` fails with `bad_descriptor`. Idempotent in
    /// the sense that a second `close()` does not panic or double-cancel —
    /// it simply also returns `bad_descriptor`, matching `spec.md` §8's
    /// "open; close; close" idempotence property.
    pub(crate) fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::bad_descriptor());
        }
        if self.linger_set.load(Ordering::Acquire) {
            let _ = self.socket.set_linger(None);
        }
        for h in self.ctx.reactor().close_descriptor(self.fd) {
            self.ctx.on_work_finished();
            self.ctx.post_boxed(h);
        }
        Ok(())
    }

    /// Retry `attempt` until it succeeds or fails for a reason other than
    /// "would block", blocking the calling thread (not the context) on a
    /// single-descriptor wait in between. Grounded on the original source's
    /// `socket_ops::poll_read`/`poll_write`: corio's synchronous socket
    /// calls do not touch the reactor at all, matching the original's split
    /// between the reactive and synchronous socket service implementations.
    pub(crate) fn sync_op<T>(&self, writable: bool, mut attempt: impl FnMut() -> io::Result<T>) -> Result<T> {
        loop {
            match attempt() {
                Ok(v) => return Ok(v),
                Err(e) if is_would_block(&e) => wait_ready(self.fd, writable)?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

pub(crate) fn is_would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(unix)]
pub(crate) fn is_in_progress(e: &io::Error) -> bool {
    is_would_block(e) || e.raw_os_error() == Some(libc::EINPROGRESS)
}
#[cfg(windows)]
pub(crate) fn is_in_progress(e: &io::Error) -> bool {
    const WSAEWOULDBLOCK: i32 = 10035;
    is_would_block(e) || e.raw_os_error() == Some(WSAEWOULDBLOCK)
}

#[cfg(unix)]
pub(crate) fn is_connection_aborted(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::ECONNABORTED || code == libc::EPROTO)
}
#[cfg(windows)]
pub(crate) fn is_connection_aborted(e: &io::Error) -> bool {
    const WSAECONNABORTED: i32 = 10053;
    e.raw_os_error() == Some(WSAECONNABORTED)
}

#[cfg(unix)]
fn wait_ready(fd: RawDescriptor, writable: bool) -> Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: if writable { libc::POLLOUT } else { libc::POLLIN },
        revents: 0,
    };
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err.into());
        }
    }
}

#[cfg(windows)]
fn wait_ready(fd: RawDescriptor, writable: bool) -> Result<()> {
    use windows_sys::Win32::Networking::WinSock::{WSAPoll, POLLRDNORM, POLLWRNORM, WSAPOLLFD};
    let mut pfd = WSAPOLLFD {
        fd: fd as _,
        events: if writable { POLLWRNORM } else { POLLRDNORM },
        revents: 0,
    };
    loop {
        let rc = unsafe { WSAPoll(&mut pfd, 1, -1) };
        if rc >= 0 {
            return Ok(());
        }
        return Err(io::Error::last_os_error().into());
    }
}

/// View a `&mut [u8]` as `&mut [MaybeUninit<u8>]` for the `socket2` APIs
/// that accept possibly-uninitialized receive buffers. Safe: `u8` has no
/// invalid bit patterns, so every already-initialized byte is already a
/// valid `MaybeUninit<u8>`.
pub(crate) fn as_uninit(buf: &mut [u8]) -> &mut [std::mem::MaybeUninit<u8>] {
    unsafe { std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), buf.len()) }
}

impl Drop for SocketImpl {
    fn drop(&mut self) {
        for h in self.ctx.reactor().close_descriptor(self.fd) {
            self.ctx.on_work_finished();
            self.ctx.post_boxed(h);
        }
    }
}

fn raw_descriptor(socket: &Socket) -> RawDescriptor {
    #[cfg(unix)]
    {
        socket.as_raw_fd()
    }
    #[cfg(windows)]
    {
        socket.as_raw_socket()
    }
}
