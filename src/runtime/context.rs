use crate::runtime::coroutine::CoroCell;
use crate::runtime::scheduler::Shared;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    /// Thread-local handle to the scheduler currently driving this
    /// thread.
    ///
    /// Installed for the duration of `block_on` so that suspension
    /// primitives reach the scheduler without explicit parameter
    /// passing.
    static CURRENT_SCHEDULER: RefCell<Option<Rc<Shared>>> = const { RefCell::new(None) };

    /// Thread-local handle to the coroutine currently being polled.
    static CURRENT_COROUTINE: RefCell<Option<Rc<CoroCell>>> = const { RefCell::new(None) };
}

/// Installs `shared` as the thread's scheduler for the duration of `f`.
///
/// # Panics
///
/// Panics if a scheduler is already installed; the runtime does not
/// support nested `block_on`.
pub(crate) fn enter_scheduler<R>(shared: Rc<Shared>, f: impl FnOnce() -> R) -> R {
    CURRENT_SCHEDULER.with(|cell| {
        let mut current = cell.borrow_mut();
        assert!(current.is_none(), "nested block_on is not supported");
        *current = Some(shared);
    });

    let out = f();

    CURRENT_SCHEDULER.with(|cell| {
        cell.borrow_mut().take();
    });

    out
}

/// Runs `f` with the current scheduler.
///
/// # Panics
///
/// Panics when called outside of a running runtime.
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&Rc<Shared>) -> R) -> R {
    CURRENT_SCHEDULER.with(|cell| {
        let binding = cell.borrow();
        let shared = binding
            .as_ref()
            .expect("operation must be performed within a running runtime");
        f(shared)
    })
}

/// Runs `f` with the current scheduler, or returns `None` outside of a
/// runtime. Used on cleanup paths that may execute during teardown.
pub(crate) fn try_with_scheduler<R>(f: impl FnOnce(&Rc<Shared>) -> R) -> Option<R> {
    CURRENT_SCHEDULER.with(|cell| cell.borrow().as_ref().map(f))
}

/// The coroutine currently being polled.
///
/// # Panics
///
/// Panics when called outside of a coroutine.
pub(crate) fn current_coroutine() -> Rc<CoroCell> {
    CURRENT_COROUTINE.with(|cell| {
        cell.borrow()
            .as_ref()
            .expect("operation must be performed within a coroutine")
            .clone()
    })
}

/// The coroutine currently being polled, if any.
pub(crate) fn try_current_coroutine() -> Option<Rc<CoroCell>> {
    CURRENT_COROUTINE.with(|cell| cell.borrow().clone())
}

/// Swaps the current-coroutine slot, returning the previous occupant.
/// The scheduler brackets every dispatch with a pair of swaps.
pub(crate) fn swap_current_coroutine(next: Option<Rc<CoroCell>>) -> Option<Rc<CoroCell>> {
    CURRENT_COROUTINE.with(|cell| cell.replace(next))
}
