//! A one-shot deadline timer integrated into a context's reactor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::clock::Deadline;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::token::Token;

static NEXT_TIMER_ID: AtomicUsize = AtomicUsize::new(1);

/// A single pending deadline. Dropping a `Timer` does not cancel it — call
/// [`Timer::cancel`] explicitly, mirroring `spec.md`'s "deterministic
/// cancellation is explicit" stance for I/O operations.
pub struct Timer {
    ctx: ExecutionContext,
    token: Token,
}

impl Timer {
    /// Schedule `on_fire` to run when `deadline` passes. `on_fire` receives
    /// `Ok(())` on a normal expiry or `Err(ErrorKind::OperationAborted)` if
    /// the timer is cancelled first.
    pub fn schedule<F>(ctx: &ExecutionContext, deadline: Deadline, on_fire: F) -> Timer
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let token = Token(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed));
        ctx.on_work_started();
        ctx.reactor().schedule_timer(deadline, token, Box::new(on_fire));
        Timer {
            ctx: ctx.clone(),
            token,
        }
    }

    pub fn after<F>(ctx: &ExecutionContext, duration: Duration, on_fire: F) -> Timer
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Timer::schedule(ctx, Deadline::after(duration), on_fire)
    }

    /// Cancel the timer if it has not already fired. Its handler, if still
    /// pending, runs with `Err(ErrorKind::OperationAborted)`.
    pub fn cancel(&self) {
        for h in self.ctx.reactor().cancel_timer(self.token) {
            self.ctx.on_work_finished();
            self.ctx.post_boxed(h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionContext;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fires_after_deadline() {
        let ctx = ExecutionContext::new().unwrap();
        let fired = Arc::new(Mutex::new(false));
        let f = fired.clone();
        let _timer = Timer::after(&ctx, Duration::from_millis(5), move |res| {
            res.unwrap();
            *f.lock().unwrap() = true;
        });
        ctx.run().unwrap();
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn cancel_delivers_aborted() {
        let ctx = ExecutionContext::new().unwrap();
        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        let timer = Timer::after(&ctx, Duration::from_secs(60), move |res| {
            *r.lock().unwrap() = Some(res.is_err());
        });
        timer.cancel();
        ctx.run().unwrap();
        assert_eq!(*result.lock().unwrap(), Some(true));
    }

    // The deadline-ordering end-to-end scenario lives in
    // `tests/deadline_order.rs`.
}
