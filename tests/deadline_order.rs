//! Timers scheduled out of deadline order still fire in deadline order.

mod util;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use corio::{ExecutionContext, Timer};

#[test]
fn deadline_order_scenario() {
    util::init();

    let ctx = ExecutionContext::new().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut timers = Vec::new();
    for (ms, id) in [(30u64, 1), (10, 2), (20, 3)] {
        let o = order.clone();
        timers.push(Timer::after(&ctx, Duration::from_millis(ms), move |_| {
            o.lock().unwrap().push(id);
        }));
    }
    ctx.run().unwrap();
    assert_eq!(*order.lock().unwrap(), vec![2, 3, 1]);
}
