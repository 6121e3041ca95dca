/// Cancellable timer queue on a virtual clock.
///
/// Time only moves when the owner says so, which keeps every timed behaviour
/// deterministic and independent of any render loop.
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Identifies one scheduled timer. Never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// A timer whose due time has been reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub handle: TimerHandle,
    pub due: Duration,
    pub payload: T,
}

#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: Duration,
    next_id: u64,
    queue: BinaryHeap<Reverse<(Duration, u64)>>,
    pending: FxHashMap<u64, T>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            queue: BinaryHeap::new(),
            pending: FxHashMap::default(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `payload` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, payload: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Reverse((self.now + delay, id)));
        self.pending.insert(id, payload);
        TimerHandle(id)
    }

    /// Stop a timer from firing. Returns `false` if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle.0).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle.0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every timer without firing it.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to
    /// its due time. Timers scheduled while handling a fired timer are
    /// measured from that due time, so chained timers keep exact spacing.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired<T>> {
        while let Some(&Reverse((due, id))) = self.queue.peek() {
            if due > until {
                break;
            }
            self.queue.pop();
            // Cancelled timers leave their heap entry behind.
            if let Some(payload) = self.pending.remove(&id) {
                self.now = self.now.max(due);
                return Some(Fired {
                    handle: TimerHandle(id),
                    due,
                    payload,
                });
            }
        }
        None
    }

    /// Move the clock forward to `until` once everything due has been popped.
    pub fn settle_at(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}
