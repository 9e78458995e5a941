use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::clock::Deadline;
use crate::context::Handler;
use crate::error::{Error, Result};
use crate::token::Token;

/// A scheduled timer's completion callback. Unlike a plain [`Handler`] it
/// takes the outcome as a parameter, so `dispatch_expired` and `cancel` can
/// each build a genuinely different completion from the same stored
/// callback instead of having to bake one outcome in at schedule time.
pub(crate) type TimerHandler = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Deadline-ordered multiset of pending timers.
///
/// Ordering across entries with identical deadlines follows insertion
/// order (`spec.md` §4.3). Cancellation is by [`Token`]; a cancelled entry
/// still sitting in the heap is lazily dropped the next time it would have
/// been popped (`dispatch_expired` or `peek_deadline` skip ids no longer
/// present in `live`).
pub(crate) struct TimerQueue {
    heap: BinaryHeap<HeapKey>,
    live: HashMap<u64, (Token, TimerHandler)>,
    by_token: HashMap<Token, Vec<u64>>,
    next_seq: u64,
}

#[derive(Eq, PartialEq)]
struct HeapKey {
    deadline: Deadline,
    seq: u64,
    id: u64,
}

// `BinaryHeap` is a max-heap; reverse the deadline (and then sequence)
// comparison so the *soonest* deadline sorts to the top.
impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TimerQueue {
    pub(crate) fn new() -> TimerQueue {
        TimerQueue {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            by_token: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Insert a new timer entry. Returns `true` iff it is now the earliest
    /// pending deadline (the reactor should shorten its wait).
    pub(crate) fn schedule(&mut self, deadline: Deadline, token: Token, handler: TimerHandler) -> bool {
        let id = self.next_seq;
        let seq = self.next_seq;
        self.next_seq += 1;

        let was_earliest = self
            .heap
            .peek()
            .map(|top| deadline < top.deadline)
            .unwrap_or(true);

        self.heap.push(HeapKey { deadline, seq, id });
        self.live.insert(id, (token, handler));
        self.by_token.entry(token).or_default().push(id);
        was_earliest
    }

    /// Remove every entry matching `token`. Returns one [`Handler`] per
    /// cancelled entry, each delivering `Err(ErrorKind::OperationAborted)`
    /// to the original `on_fire` callback — a genuinely different
    /// completion than a normal expiry, not the success outcome replayed.
    pub(crate) fn cancel(&mut self, token: Token) -> Vec<Handler> {
        let ids = self.by_token.remove(&token).unwrap_or_default();
        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, handler)) = self.live.remove(&id) {
                cancelled.push(Box::new(move || handler(Err(Error::operation_aborted()))) as Handler);
            }
        }
        cancelled
    }

    /// Extract and return handlers for every entry whose deadline has
    /// passed as of `now`, each delivering `Ok(())` to the original
    /// `on_fire` callback.
    pub(crate) fn dispatch_expired(&mut self, now: Deadline) -> Vec<Handler> {
        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if !top.deadline.is_past(now) {
                break;
            }
            let key = self.heap.pop().unwrap();
            if let Some((token, handler)) = self.live.remove(&key.id) {
                if let Some(ids) = self.by_token.get_mut(&token) {
                    ids.retain(|&x| x != key.id);
                    if ids.is_empty() {
                        self.by_token.remove(&token);
                    }
                }
                fired.push(Box::new(move || handler(Ok(()))) as Handler);
            }
            // else: entry was already cancelled; lazily dropped here.
        }
        fired
    }

    /// Soonest live deadline, skipping lazily-cancelled heap entries.
    fn soonest(&mut self) -> Option<Deadline> {
        while let Some(top) = self.heap.peek() {
            if self.live.contains_key(&top.id) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Soonest deadline minus `now`, saturated to zero, capped at `ceiling`.
    pub(crate) fn wait_duration(&mut self, now: Deadline, ceiling: std::time::Duration) -> std::time::Duration {
        match self.soonest() {
            Some(deadline) => deadline.remaining(now).min(ceiling),
            None => ceiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let mut q = TimerQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let now = Deadline::now();

        for (ms, id) in [(30u64, 1), (10, 2), (20, 3)] {
            let o = order.clone();
            q.schedule(
                Deadline::after(Duration::from_millis(ms)),
                Token(id),
                Box::new(move |_| o.lock().unwrap().push(id)),
            );
        }

        let later = Deadline::after(Duration::from_millis(40));
        for h in q.dispatch_expired(later) {
            h();
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 3, 1]);
        let _ = now;
    }

    #[test]
    fn cancel_prevents_firing() {
        let mut q = TimerQueue::new();
        let fired = Arc::new(Mutex::new(false));
        let f = fired.clone();
        q.schedule(Deadline::now(), Token(7), Box::new(move |_| *f.lock().unwrap() = true));
        let cancelled = q.cancel(Token(7));
        assert_eq!(cancelled.len(), 1);
        let later = Deadline::after(Duration::from_millis(1));
        assert!(q.dispatch_expired(later).is_empty());
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn cancel_delivers_operation_aborted() {
        let mut q = TimerQueue::new();
        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        q.schedule(Deadline::now(), Token(3), Box::new(move |res| *r.lock().unwrap() = Some(res)));
        let cancelled = q.cancel(Token(3));
        assert_eq!(cancelled.len(), 1);
        cancelled.into_iter().for_each(|h| h());
        let got = result.lock().unwrap().take().unwrap();
        assert_eq!(got.unwrap_err().kind(), crate::error::ErrorKind::OperationAborted);
    }

    #[test]
    fn wait_duration_zero_for_past_deadline() {
        let mut q = TimerQueue::new();
        q.schedule(Deadline::now(), Token(1), Box::new(|_| {}));
        let now = Deadline::now();
        assert_eq!(q.wait_duration(now, Duration::from_secs(5)), Duration::ZERO);
    }
}
