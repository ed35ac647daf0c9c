use crate::error::Result;
use crate::runtime::context;
use crate::runtime::coroutine::{self, Coroutine};
use crate::runtime::scheduler::{self, Shared};

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

/// The runtime handle: one single-threaded cooperative scheduler.
///
/// A `Runtime` owns the ready queue, the timer queue, and the reactor.
/// Coroutines belong to the runtime that spawned them and never migrate.
/// [`block_on`](Self::block_on) drives the scheduler on the calling
/// thread until the given future (itself a coroutine) completes.
///
/// Coroutines still suspended when `block_on` returns stay owned by the
/// runtime; dropping the runtime discards them.
pub struct Runtime {
    shared: Rc<Shared>,
}

impl Runtime {
    pub(crate) fn new(event_capacity: usize) -> Self {
        Self {
            shared: Shared::new(event_capacity),
        }
    }

    /// Spawns a coroutine onto the runtime.
    ///
    /// Usable before or between [`block_on`](Self::block_on) calls; the
    /// coroutine starts running once the scheduler is entered. Inside a
    /// running coroutine, prefer [`spawn`](crate::spawn), which also
    /// honors cancellation of the spawner.
    pub fn spawn<F>(&self, body: F) -> Coroutine
    where
        F: Future<Output = Result<()>> + 'static,
    {
        coroutine::spawn_on(&self.shared, body)
    }

    /// Runs a future to completion, blocking the current thread.
    ///
    /// The future runs as a coroutine alongside everything spawned from
    /// it. Suspension primitives (`yield_now`, `sleep`, channel
    /// operations, descriptor polling) are usable directly in its body.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a running runtime, or when the
    /// scheduler runs out of wakeable work before the future completes
    /// (every remaining coroutine is parked with nothing to resume it).
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let runtime = RuntimeBuilder::new().build();
    /// let value = runtime.block_on(async { 42 });
    /// assert_eq!(value, 42);
    /// ```
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let slot: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));

        let cell = scheduler::new_cell(&self.shared);
        let wrapped = {
            let slot = slot.clone();
            async move {
                *slot.borrow_mut() = Some(future.await);
            }
        };
        scheduler::install(&self.shared, cell, Box::pin(wrapped));

        let probe = slot.clone();
        context::enter_scheduler(self.shared.clone(), || {
            scheduler::run(&self.shared, || probe.borrow().is_some());
        });

        let value = slot.borrow_mut().take();
        value.expect("scheduler ran out of wakeable work before the main coroutine completed")
    }
}
