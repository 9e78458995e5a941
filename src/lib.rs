//! `corio`: a portable asynchronous execution core.
//!
//! An [`ExecutionContext`] runs on one or more worker threads, draining a
//! FIFO of completion handlers and polling a [`Reactor`] for descriptor
//! readiness and expired timers in between. A [`TimerQueue`] is folded into
//! the reactor's wait. The socket service layer (`net`, `socket`) implements
//! the connect/accept/send/recv state machine against that reactor.
//!
//! This crate does not itself provide an async/await surface: handlers are
//! plain `FnOnce() + Send` closures, posted or dispatched explicitly, in the
//! style of `boost::asio::io_context` rather than a `Future`-based executor.

mod buffer;
mod clock;
mod context;
mod error;
mod reactor;
mod resolve;
mod socket;
mod strand;
mod sys;
mod timer_queue;
mod token;
mod work;

pub mod net;

pub use context::{ExecutionContext, ExecutionContextConfig};
pub use error::{Error, ErrorKind, Result};
pub use resolve::resolve;
pub use strand::Strand;
pub use token::Token;
pub use work::WorkGuard;

pub use net::tcp::{TcpAcceptor, TcpStream};
pub use net::timer::Timer;
pub use net::udp::UdpSocket;
