use std::time::{Duration, Instant};

/// A monotonic deadline, distinct from wall-clock time.
///
/// Wraps [`std::time::Instant`], which on every platform corio targets is
/// backed by a monotonic clock source (`CLOCK_MONOTONIC` on Unix,
/// `QueryPerformanceCounter` on Windows) with sub-millisecond resolution —
/// comfortably inside the "at least millisecond resolution" requirement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn now() -> Deadline {
        Deadline(Instant::now())
    }

    pub fn after(duration: Duration) -> Deadline {
        Deadline(Instant::now() + duration)
    }

    pub fn at(instant: Instant) -> Deadline {
        Deadline(instant)
    }

    /// Saturating duration from `now` until this deadline; zero if already
    /// past.
    pub fn remaining(self, now: Deadline) -> Duration {
        self.0.saturating_duration_since(now.0)
    }

    pub fn is_past(self, now: Deadline) -> bool {
        self.0 <= now.0
    }

    pub fn into_instant(self) -> Instant {
        self.0
    }
}
