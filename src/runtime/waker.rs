use crate::runtime::injector::Injector;

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Per-coroutine wake state.
///
/// Waking pushes the coroutine id into the injector. The `queued` latch
/// collapses repeated wakes between two dispatches into a single ready
/// queue entry, keeping round-robin order deterministic.
pub(crate) struct WakeHandle {
    /// Id of the coroutine this handle wakes.
    id: u64,

    /// Whether the id currently sits in the injector or ready queue.
    queued: AtomicBool,

    /// Destination queue.
    injector: Arc<Injector>,
}

impl WakeHandle {
    pub(crate) fn new(id: u64, injector: Arc<Injector>) -> Arc<Self> {
        Arc::new(Self {
            id,
            queued: AtomicBool::new(false),
            injector,
        })
    }

    /// Enqueues the coroutine unless it is already queued.
    pub(crate) fn wake(&self) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.injector.push(self.id);
        }
    }

    /// Releases the latch; called by the scheduler when the coroutine is
    /// dispatched so that wakes arriving during its poll re-enqueue it.
    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }
}

/// The `RawWakerVTable` shared by all coroutine wakers.
///
/// # Safety
///
/// Every pointer stored in a `RawWaker` built from this table originates
/// from `Arc::<WakeHandle>::into_raw`, and the clone/wake/drop functions
/// keep the reference count balanced.
fn vtable() -> &'static RawWakerVTable {
    &RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw)
}

/// Creates the [`Waker`] resuming one coroutine.
pub(crate) fn make_waker(handle: Arc<WakeHandle>) -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(handle) as *const (), vtable())) }
}

fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::<WakeHandle>::from_raw(ptr as *const WakeHandle) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), vtable())
}

fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<WakeHandle>::from_raw(ptr as *const WakeHandle) };
    arc.wake();
}

fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<WakeHandle>::from_raw(ptr as *const WakeHandle) };
    arc.wake();
    mem::forget(arc);
}

fn drop_raw(ptr: *const ()) {
    unsafe { Arc::<WakeHandle>::from_raw(ptr as *const WakeHandle) };
}
