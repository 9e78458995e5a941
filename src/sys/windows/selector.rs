use std::io;
use std::sync::Mutex;
use std::time::Duration;

use windows_sys::Win32::Networking::WinSock::{WSAPoll, POLLRDNORM, POLLWRNORM, SOCKET, WSAPOLLFD};

use crate::sys::Interest;
use crate::token::Token;

pub(crate) type RawSocket = SOCKET;

struct Registration {
    socket: RawSocket,
    token: Token,
    interests: Interest,
}

#[derive(Debug)]
pub struct Selector {
    registrations: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("socket", &self.socket).finish()
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
        let mut fds: Vec<WSAPOLLFD> = regs
            .iter()
            .map(|r| WSAPOLLFD {
                fd: r.socket,
                events: interests_to_poll(r.interests),
                revents: 0,
            })
            .collect();
        drop(regs);

        let timeout_ms = timeout.map(|to| to.as_millis() as i32).unwrap_or(-1);
        let n = unsafe { WSAPoll(fds.as_mut_ptr(), fds.len() as u32, timeout_ms) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        events.0.clear();
        if n > 0 {
            let regs = self.registrations.lock().unwrap();
            for pfd in &fds {
                if pfd.revents != 0 {
                    if let Some(r) = regs.iter().find(|r| r.socket == pfd.fd) {
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

    pub fn register(&self, socket: RawSocket, token: Token, interests: Interest) -> io::Result<()> {
        let mut regs = self.registrations.lock().unwrap();
        regs.push(Registration { socket, token, interests });
        Ok(())
    }

    pub fn reregister(&self, socket: RawSocket, token: Token, interests: Interest) -> io::Result<()> {
        let mut regs = self.registrations.lock().unwrap();
        if let Some(r) = regs.iter_mut().find(|r| r.socket == socket) {
            r.token = token;
            r.interests = interests;
        }
        Ok(())
    }

    pub fn deregister(&self, socket: RawSocket) -> io::Result<()> {
        let mut regs = self.registrations.lock().unwrap();
        regs.retain(|r| r.socket != socket);
        Ok(())
    }
}

fn interests_to_poll(interests: Interest) -> i16 {
    let mut mask = 0;
    if interests.is_readable() {
        mask |= POLLRDNORM;
    }
    if interests.is_writable() {
        mask |= POLLWRNORM;
    }
    mask as i16
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    token: Token,
    revents: i16,
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
    use windows_sys::Win32::Networking::WinSock::{POLLERR, POLLHUP, POLLRDNORM, POLLWRNORM};

    pub fn token(event: &Event) -> Token {
        event.token
    }

    pub fn is_readable(event: &Event) -> bool {
        (event.revents & (POLLRDNORM | POLLHUP)) != 0
    }

    pub fn is_writable(event: &Event) -> bool {
        (event.revents & POLLWRNORM) != 0
    }

    pub fn is_error(event: &Event) -> bool {
        (event.revents & POLLERR) != 0
    }

    pub fn is_read_closed(event: &Event) -> bool {
        (event.revents & POLLHUP) != 0
    }
}
