use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::task::Waker;
use std::time::Instant;

/// Handle to a pending timer entry.
///
/// Cancelling marks the heap entry stale; the queue skips stale entries
/// when they reach the top. Cancellation is idempotent.
#[derive(Clone)]
pub(crate) struct TimerHandle(Rc<Cell<bool>>);

impl TimerHandle {
    pub(crate) fn cancel(&self) {
        self.0.set(true);
    }
}

/// An entry in the scheduler timer queue.
///
/// Entries order by deadline, ties broken by insertion sequence so that
/// two timers armed for the same instant fire in arming order.
struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Monotonic insertion sequence, the secondary ordering key.
    seq: u64,

    /// Waker of the coroutine to resume at the deadline.
    waker: Waker,

    /// Cancellation flag shared with the [`TimerHandle`].
    cancelled: Rc<Cell<bool>>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by `(deadline, seq)`.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap, popping the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending deadlines.
///
/// The scheduler consults [`next_deadline`](Self::next_deadline) to bound
/// the poller's blocking timeout and calls [`expire`](Self::expire) after
/// every poll to wake the owners of elapsed entries in deadline order.
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Arms a timer at `deadline` waking `waker`, returning the handle
    /// that cancels it.
    pub(crate) fn insert(&mut self, deadline: Instant, waker: &Waker) -> TimerHandle {
        let cancelled = Rc::new(Cell::new(false));

        self.heap.push(TimerEntry {
            deadline,
            seq: self.seq,
            waker: waker.clone(),
            cancelled: cancelled.clone(),
        });
        self.seq += 1;

        TimerHandle(cancelled)
    }

    /// The earliest pending deadline, discarding cancelled entries.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            if entry.cancelled.get() {
                self.heap.pop();
                continue;
            }
            return Some(entry.deadline);
        }
        None
    }

    /// Wakes every entry with a deadline at or before `now`.
    ///
    /// Entries fire in `(deadline, seq)` order, which makes the wake
    /// order of simultaneously-expired timers deterministic.
    pub(crate) fn expire(&mut self, now: Instant) {
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }

            let entry = self.heap.pop().expect("peeked entry missing");

            if entry.cancelled.get() {
                continue;
            }

            entry.waker.wake();
        }
    }
}
