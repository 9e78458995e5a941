//! Several threads calling `run()` on the same context between them execute
//! every posted handler exactly once.

mod util;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use corio::ExecutionContext;

#[test]
fn multi_thread_run_counts_all_handlers() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..10_000 {
        let c = counter.clone();
        ctx.post(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mut threads = Vec::new();
    for _ in 0..4 {
        let ctx = ctx.clone();
        threads.push(thread::spawn(move || ctx.run().unwrap()));
    }
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10_000);
}
