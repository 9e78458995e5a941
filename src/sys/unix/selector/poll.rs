//! Fallback backend for Unix platforms without epoll or kqueue, built on
//! plain `poll(2)`. Registration state must be tracked by corio itself
//! since `poll(2)` takes the full descriptor set on every call.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::time::Duration;

use crate::sys::Interest;
use crate::token::Token;

struct Registration {
    fd: RawFd,
    token: Token,
    interests: Interest,
}

#[derive(Debug)]
pub struct Selector {
    registrations: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("fd", &self.fd).finish()
    }
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        Ok(Selector {
            registrations: Mutex::new(Vec::new()),
        })
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let regs = self.registrations.lock().unwrap();
        let mut pollfds: Vec<libc::pollfd> = regs
            .iter()
            .map(|r| libc::pollfd {
                fd: r.fd,
                events: interests_to_poll(r.interests),
                revents: 0,
            })
            .collect();
        drop(regs);

        let timeout_ms = timeout.map(|to| to.as_millis() as libc::c_int).unwrap_or(-1);
        let n = syscall!(poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_ms,
        ))?;

        events.0.clear();
        if n > 0 {
            let regs = self.registrations.lock().unwrap();
            for pfd in &pollfds {
                if pfd.revents != 0 {
                    if let Some(r) = regs.iter().find(|r| r.fd == pfd.fd) {
                        events.0.push(Event {
                            token: r.token,
                            revents: pfd.revents,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn register(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let mut regs = self.registrations.lock().unwrap();
        regs.push(Registration { fd, token, interests });
        Ok(())
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let mut regs = self.registrations.lock().unwrap();
        if let Some(r) = regs.iter_mut().find(|r| r.fd == fd) {
            r.token = token;
            r.interests = interests;
        }
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let mut regs = self.registrations.lock().unwrap();
        regs.retain(|r| r.fd != fd);
        Ok(())
    }
}

fn interests_to_poll(interests: Interest) -> libc::c_short {
    let mut mask = 0;
    if interests.is_readable() {
        mask |= libc::POLLIN;
    }
    if interests.is_writable() {
        mask |= libc::POLLOUT;
    }
    mask as libc::c_short
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    token: Token,
    revents: libc::c_short,
}

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
        event.token
    }

    pub fn is_readable(event: &Event) -> bool {
        (event.revents as libc::c_int & (libc::POLLIN | libc::POLLHUP)) != 0
    }

    pub fn is_writable(event: &Event) -> bool {
        (event.revents as libc::c_int & libc::POLLOUT) != 0
    }

    pub fn is_error(event: &Event) -> bool {
        (event.revents as libc::c_int & libc::POLLERR) != 0
    }

    pub fn is_read_closed(event: &Event) -> bool {
        (event.revents as libc::c_int & libc::POLLHUP) != 0
    }
}
