//! Platform selection: exactly one backend is compiled in, chosen at build
//! time, per `spec.md` §4.2 ("the choice is fixed at build time per
//! platform").

mod interest;
pub(crate) use interest::Interest;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{event, Event, Events, Selector, Waker};
#[cfg(unix)]
pub(crate) type RawDescriptor = std::os::unix::io::RawFd;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::{event, Event, Events, Selector, Waker};
#[cfg(windows)]
pub(crate) use windows::winsock_init;
#[cfg(windows)]
pub(crate) type RawDescriptor = std::os::windows::io::RawSocket;
