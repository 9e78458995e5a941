//! `Strand`: serialized execution over a shared [`ExecutionContext`].
//!
//! Grounded on `spec.md §6`'s description of `Strand` as "trivial given
//! dispatch/post and a mutex", made concrete the way `context.rs`'s own
//! nested-dispatch tracking (`EnterGuard`/`CURRENT_CONTEXT`) already does
//! it: a thread-local marks which strand, if any, the calling thread is
//! currently running a handler for.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::{ExecutionContext, Handler};

thread_local! {
    static CURRENT_STRAND: Cell<Option<usize>> = const { Cell::new(None) };
}

struct StrandEnterGuard {
    previous: Option<usize>,
}

impl StrandEnterGuard {
    fn enter(id: usize) -> StrandEnterGuard {
        let previous = CURRENT_STRAND.with(|c| c.replace(Some(id)));
        StrandEnterGuard { previous }
    }
}

impl Drop for StrandEnterGuard {
    fn drop(&mut self) {
        CURRENT_STRAND.with(|c| c.set(self.previous));
    }
}

static NEXT_STRAND_ID: AtomicUsize = AtomicUsize::new(1);

struct StrandState {
    queue: VecDeque<Handler>,
    in_flight: bool,
}

struct StrandShared {
    id: usize,
    ctx: ExecutionContext,
    state: Mutex<StrandState>,
}

/// A serializing wrapper over an [`ExecutionContext`]: handlers posted or
/// dispatched through the same `Strand` never run concurrently with one
/// another, even when multiple threads call `run()` on the underlying
/// context. Cheaply cloneable, like `ExecutionContext` itself.
#[derive(Clone)]
pub struct Strand {
    inner: Arc<StrandShared>,
}

impl Strand {
    pub fn new(ctx: &ExecutionContext) -> Strand {
        Strand {
            inner: Arc::new(StrandShared {
                id: NEXT_STRAND_ID.fetch_add(1, Ordering::Relaxed),
                ctx: ctx.clone(),
                state: Mutex::new(StrandState {
                    queue: VecDeque::new(),
                    in_flight: false,
                }),
            }),
        }
    }

    /// Enqueue `h` behind this strand. Never runs inline, even if the
    /// calling thread is already running a handler for this strand.
    pub fn post<F>(&self, h: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(h));
    }

    /// Enqueue `h` behind this strand, unless the calling thread is already
    /// executing a handler dispatched through this same strand, in which
    /// case `h` runs immediately and inline.
    pub fn dispatch<F>(&self, h: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if CURRENT_STRAND.with(|c| c.get() == Some(self.inner.id)) {
            h();
        } else {
            self.enqueue(Box::new(h));
        }
    }

    /// Returns a callable that dispatches `h` through this strand when
    /// invoked, mirroring [`ExecutionContext::wrap`].
    pub fn wrap<F>(&self, h: F) -> impl FnOnce() + Send + 'static
    where
        F: FnOnce() + Send + 'static,
    {
        let strand = self.clone();
        move || strand.dispatch(h)
    }

    fn enqueue(&self, h: Handler) {
        let mut g = self.inner.state.lock().unwrap();
        g.queue.push_back(h);
        if g.in_flight {
            return;
        }
        g.in_flight = true;
        drop(g);
        self.schedule_run();
    }

    fn schedule_run(&self) {
        let strand = self.clone();
        self.inner.ctx.post(move || strand.run_one());
    }

    /// Run exactly one queued handler, then either hand off to the next one
    /// (via another `ctx.post`, keeping each handler's execution a distinct
    /// FIFO entry like any other posted work) or mark the strand idle.
    fn run_one(&self) {
        let h = {
            let mut g = self.inner.state.lock().unwrap();
            g.queue.pop_front()
        };
        let Some(h) = h else {
            return;
        };

        let _guard = StrandEnterGuard::enter(self.inner.id);
        h();
        drop(_guard);

        let mut g = self.inner.state.lock().unwrap();
        if g.queue.is_empty() {
            g.in_flight = false;
        } else {
            drop(g);
            self.schedule_run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize as AU, Ordering as Ord};
    use std::thread;

    #[test]
    fn serializes_across_posting_threads() {
        let ctx = ExecutionContext::new().unwrap();
        let strand = Strand::new(&ctx);
        let order = Arc::new(Mutex::new(Vec::new()));
        let concurrent = Arc::new(AU::new(0));
        let max_concurrent = Arc::new(AU::new(0));

        let mut threads = Vec::new();
        for i in 0..8 {
            let strand = strand.clone();
            let order = order.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            threads.push(thread::spawn(move || {
                strand.post(move || {
                    let now = concurrent.fetch_add(1, Ord::SeqCst) + 1;
                    max_concurrent.fetch_max(now, Ord::SeqCst);
                    order.lock().unwrap().push(i);
                    concurrent.fetch_sub(1, Ord::SeqCst);
                });
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        let mut runners = Vec::new();
        for _ in 0..4 {
            let ctx = ctx.clone();
            runners.push(thread::spawn(move || ctx.run().unwrap()));
        }
        for r in runners {
            r.join().unwrap();
        }

        assert_eq!(order.lock().unwrap().len(), 8);
        assert_eq!(max_concurrent.load(Ord::SeqCst), 1);
    }

    #[test]
    fn dispatch_inside_own_handler_runs_inline() {
        let ctx = ExecutionContext::new().unwrap();
        let strand = Strand::new(&ctx);
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let strand2 = strand.clone();
        strand.post(move || {
            o1.lock().unwrap().push(1);
            let o2 = o1.clone();
            strand2.dispatch(move || {
                o2.lock().unwrap().push(2);
            });
            o1.lock().unwrap().push(3);
        });
        ctx.run().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }
}
