use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use crate::sys::Interest;
use crate::token::Token;

#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

macro_rules! kevent {
    ($id:expr, $filter:expr, $flags:expr, $data:expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as _,
            flags: $flags,
            fflags: 0,
            data: 0,
            udata: $data as *mut libc::c_void as _,
        }
    };
}

#[derive(Debug)]
pub struct Selector {
    kq: RawFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let kq = syscall!(kqueue())?;
        syscall!(fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC))?;
        Ok(Selector { kq })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.kq
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let ts = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs() as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let ts_ptr = ts
            .as_ref()
            .map(|s| s as *const _)
            .unwrap_or(ptr::null());

        events.0.clear();
        let n = syscall!(kevent(
            self.kq,
            ptr::null(),
            0,
            events.0.as_mut_ptr(),
            events.0.capacity() as Count,
            ts_ptr,
        ))?;
        unsafe { events.0.set_len(n as usize) };
        Ok(())
    }

    fn apply(&self, changes: &[libc::kevent]) -> io::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        syscall!(kevent(
            self.kq,
            changes.as_ptr(),
            changes.len() as Count,
            ptr::null_mut(),
            0,
            ptr::null(),
        ))
        .map(|_| ())
    }

    pub fn register(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        self.reregister(fd, token, interests)
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let flags_add = libc::EV_ADD | libc::EV_CLEAR;
        let mut changes = Vec::with_capacity(2);
        if interests.is_readable() {
            changes.push(kevent!(fd, libc::EVFILT_READ, flags_add, token.as_usize()));
        } else {
            changes.push(kevent!(fd, libc::EVFILT_READ, libc::EV_DELETE, 0));
        }
        if interests.is_writable() {
            changes.push(kevent!(fd, libc::EVFILT_WRITE, flags_add, token.as_usize()));
        } else {
            changes.push(kevent!(fd, libc::EVFILT_WRITE, libc::EV_DELETE, 0));
        }
        // EV_DELETE on a filter that was never added returns ENOENT; harmless.
        for change in &changes {
            let one = [*change];
            let _ = self.apply(&one);
        }
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let del_read = kevent!(fd, libc::EVFILT_READ, libc::EV_DELETE, 0);
        let del_write = kevent!(fd, libc::EVFILT_WRITE, libc::EV_DELETE, 0);
        let _ = self.apply(&[del_read]);
        let _ = self.apply(&[del_write]);
        Ok(())
    }
}

pub type Event = libc::kevent;

#[derive(Debug)]
pub struct Events(Vec<Event>);

impl Events {
    pub fn with_capacity(capacity: usize) -> Events {
        Events(Vec::with_capacity(capacity))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.0.iter()
    }
}

pub mod event {
    use super::Event;
    use crate::token::Token;

    pub fn token(event: &Event) -> Token {
        Token(event.udata as usize)
    }

    pub fn is_readable(event: &Event) -> bool {
        event.filter == libc::EVFILT_READ as _
    }

    pub fn is_writable(event: &Event) -> bool {
        event.filter == libc::EVFILT_WRITE as _
    }

    pub fn is_error(event: &Event) -> bool {
        (event.flags & libc::EV_ERROR) != 0
    }

    pub fn is_read_closed(event: &Event) -> bool {
        event.filter == libc::EVFILT_READ as _ && (event.flags & libc::EV_EOF) != 0
    }
}
