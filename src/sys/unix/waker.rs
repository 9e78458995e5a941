use std::io;
use std::os::unix::io::RawFd;

use crate::sys::Interest;
use crate::sys::Selector;
use crate::token::Token;

#[cfg(any(target_os = "android", target_os = "illumos", target_os = "linux"))]
mod backend {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

    #[derive(Debug)]
    pub(super) struct Backend(File);

    impl Backend {
        pub(super) fn new() -> io::Result<Backend> {
            let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
            Ok(Backend(unsafe { File::from_raw_fd(fd) }))
        }

        pub(super) fn as_raw_fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }

        pub(super) fn wake(&self) -> io::Result<()> {
            match (&self.0).write(&1u64.to_ne_bytes()) {
                Ok(_) => Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e),
            }
        }

        pub(super) fn drain(&self) {
            let mut buf = [0u8; 8];
            let _ = (&self.0).read(&mut buf);
        }
    }
}

#[cfg(not(any(target_os = "android", target_os = "illumos", target_os = "linux")))]
mod backend {
    use std::io::{self, Read, Write};
    use std::os::unix::io::{FromRawFd, RawFd};
    use std::fs::File;

    #[derive(Debug)]
    pub(super) struct Backend {
        reader: File,
        writer: File,
    }

    impl Backend {
        pub(super) fn new() -> io::Result<Backend> {
            let mut fds = [0 as libc::c_int; 2];
            syscall!(pipe(fds.as_mut_ptr()))?;
            unsafe {
                libc::fcntl(fds[0], libc::F_SETFL, libc::O_NONBLOCK);
                libc::fcntl(fds[1], libc::F_SETFL, libc::O_NONBLOCK);
                libc::fcntl(fds[0], libc::F_SETFD, libc::FD_CLOEXEC);
                libc::fcntl(fds[1], libc::F_SETFD, libc::FD_CLOEXEC);
            }
            Ok(Backend {
                reader: unsafe { File::from_raw_fd(fds[0]) },
                writer: unsafe { File::from_raw_fd(fds[1]) },
            })
        }

        pub(super) fn as_raw_fd(&self) -> RawFd {
            use std::os::unix::io::AsRawFd;
            self.reader.as_raw_fd()
        }

        pub(super) fn wake(&self) -> io::Result<()> {
            match (&self.writer).write(&[1u8]) {
                Ok(_) => Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e),
            }
        }

        pub(super) fn drain(&self) {
            let mut buf = [0u8; 64];
            loop {
                match (&self.reader).read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        }
    }
}

/// A self-pipe: a descriptor the reactor always watches for read
/// readiness, written to whenever something needs `poll` to return early.
#[derive(Debug)]
pub struct Waker {
    backend: backend::Backend,
}

impl Waker {
    pub fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
        let backend = backend::Backend::new()?;
        selector.register(backend.as_raw_fd(), token, Interest::readable())?;
        Ok(Waker { backend })
    }

    pub fn wake(&self) -> io::Result<()> {
        self.backend.wake()
    }

    pub fn ack(&self) {
        self.backend.drain();
    }

    pub fn raw_fd(&self) -> RawFd {
        self.backend.as_raw_fd()
    }
}
