//! Windows backend.
//!
//! The full IOCP-based proactor the teacher crate implements (`sys::windows`
//! in upstream `mio`, driven by AFD polling) is out of scope here — per
//! `spec.md` §4.2 the Windows backend's "semantic surface is reduced to the
//! same readiness-plus-cancel API" as the Unix backends. This module
//! implements that reduced surface with `WSAPoll`, the closest Windows
//! analogue to `poll(2)`.

mod selector;
mod waker;
mod winsock;

pub(crate) use selector::{event, Event, Events, Selector};
pub(crate) use waker::Waker;
pub(crate) use winsock::ensure_initialized as winsock_init;
