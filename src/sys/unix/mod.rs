//! Unix backend: one readiness `Selector` per the compiled-in platform, a
//! self-pipe-style `Waker`, and raw `libc` socket helpers.

macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

pub(crate) mod waker;

#[cfg(any(target_os = "android", target_os = "illumos", target_os = "linux"))]
#[path = "selector/epoll.rs"]
mod selector_impl;

#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd"
))]
#[path = "selector/kqueue.rs"]
mod selector_impl;

#[cfg(not(any(
    target_os = "android",
    target_os = "illumos",
    target_os = "linux",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
#[path = "selector/poll.rs"]
mod selector_impl;

pub(crate) use selector_impl::{event, Event, Events, Selector};

pub(crate) use waker::Waker;
