use crate::reactor::poller::Waker as PollerWaker;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Wake queue feeding the scheduler's ready queue.
///
/// Every waker pushes the id of its coroutine here; the scheduler drains
/// the queue at the top of each loop iteration, preserving push order so
/// that timer expirations and I/O completions reach the ready queue in
/// the order they occurred.
///
/// The injector is the only runtime structure shared across threads: a
/// waker cloned into a foreign thread pushes here and, when the
/// scheduler is parked inside the poller, interrupts it through the
/// poller's wake signal.
pub(crate) struct Injector {
    /// Pending coroutine ids in push order.
    queue: Mutex<VecDeque<u64>>,

    /// Set while the scheduler is blocked inside the poller.
    parked: AtomicBool,

    /// Wake signal of the poller.
    poller: Arc<PollerWaker>,
}

impl Injector {
    pub(crate) fn new(poller: Arc<PollerWaker>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            parked: AtomicBool::new(false),
            poller,
        }
    }

    /// Enqueues a coroutine id, interrupting a parked poller.
    pub(crate) fn push(&self, id: u64) {
        self.queue.lock().unwrap().push_back(id);

        if self.parked.load(Ordering::SeqCst) {
            self.poller.wake();
        }
    }

    /// Removes and returns all pending ids in push order.
    pub(crate) fn drain(&self) -> VecDeque<u64> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Marks the scheduler as parked in (or released from) the poller.
    ///
    /// Must be set before the final emptiness check that precedes a
    /// blocking poll; the ordering guarantees a concurrent push either
    /// lands in that check or observes the flag and fires the wake
    /// signal.
    pub(crate) fn set_parked(&self, parked: bool) {
        self.parked.store(parked, Ordering::SeqCst);
    }
}
