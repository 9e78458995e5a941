use std::sync::Arc;

use crate::context::ContextShared;

/// A bump on the context's outstanding-work counter.
///
/// While at least one `WorkGuard` (or in-flight operation, which uses the
/// same counter internally) is alive, [`crate::ExecutionContext::run`] is
/// guaranteed not to return due to having no work — only `stop()` can make
/// `run()` return early while a guard is held.
pub struct WorkGuard {
    ctx: Arc<ContextShared>,
    released: bool,
}

impl WorkGuard {
    pub(crate) fn new(ctx: Arc<ContextShared>) -> WorkGuard {
        ctx.on_work_started();
        WorkGuard {
            ctx,
            released: false,
        }
    }

    /// Release the guard's bump without waiting for `Drop`. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.ctx.on_work_finished();
            self.released = true;
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.release();
    }
}
