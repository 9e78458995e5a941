#![allow(dead_code)]

use std::sync::Once;

/// Initialize `env_logger` once per process, mirroring the teacher's own
/// `tests/util::init` so integration tests can opt into reactor tracing via
/// `RUST_LOG=corio=trace`.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    })
}
