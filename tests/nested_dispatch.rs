//! `dispatch` called from inside a running handler executes inline instead
//! of going back through the FIFO.

mod util;

use std::sync::{Arc, Mutex};

use corio::ExecutionContext;

#[test]
fn dispatch_nested_runs_inline() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = order.clone();
    let ctx2 = ctx.clone();
    ctx.post(move || {
        o1.lock().unwrap().push(1);
        let o2 = o1.clone();
        ctx2.dispatch(move || {
            o2.lock().unwrap().push(2);
        });
        o1.lock().unwrap().push(3);
    });
    ctx.run().unwrap();
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}
