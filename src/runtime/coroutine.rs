use crate::channel::WaiterCore;
use crate::error::{Error, Result};
use crate::io::PollEvent;
use crate::reactor::timer::TimerHandle;
use crate::runtime::context;
use crate::runtime::scheduler::{self, Shared};
use crate::runtime::waker::WakeHandle;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::mem;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Lifecycle state of a coroutine.
///
/// A coroutine is created `Ready`, alternates between `Running` and
/// `Suspended` while it lives, and ends `Finished` when its body returns
/// (or an error escapes it) or `Cancelled` when a cancel request was
/// observed at a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    Running,
    Suspended,
    Cancelled,
    Finished,
}

/// Where a suspended coroutine currently waits.
///
/// Cancellation uses this to detach the coroutine from its wait
/// structure in constant time before enqueueing it.
pub(crate) enum WaitSite {
    None,
    Timer(TimerHandle),
    Channel {
        core: Rc<WaiterCore>,
        timer: Option<TimerHandle>,
    },
    Fd {
        fd: RawFd,
        event: PollEvent,
        timer: Option<TimerHandle>,
    },
}

/// Control cell of one coroutine, shared between the scheduler record
/// and every [`Coroutine`] handle.
///
/// The cell outlives the coroutine's future: after the coroutine
/// finishes, handles keep the cell alive so `cancel` stays safe to call.
pub(crate) struct CoroCell {
    id: u64,
    state: Cell<State>,
    cancel_requested: Cell<bool>,
    wait: RefCell<WaitSite>,
    wake: Arc<WakeHandle>,
    sched: Weak<Shared>,
}

impl CoroCell {
    pub(crate) fn new(id: u64, wake: Arc<WakeHandle>, sched: Weak<Shared>) -> Rc<Self> {
        Rc::new(Self {
            id,
            state: Cell::new(State::Ready),
            cancel_requested: Cell::new(false),
            wait: RefCell::new(WaitSite::None),
            wake,
            sched,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> State {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.set(state);
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested.get()
    }

    pub(crate) fn set_wait(&self, site: WaitSite) {
        *self.wait.borrow_mut() = site;
    }

    pub(crate) fn clear_wait(&self) {
        *self.wait.borrow_mut() = WaitSite::None;
    }

    pub(crate) fn wake_handle(&self) -> &Arc<WakeHandle> {
        &self.wake
    }

    /// Requests cancellation: sets the flag, detaches the coroutine from
    /// whatever wait structure it occupies, and enqueues it so the next
    /// poll of its suspension point observes the request.
    ///
    /// Never blocks; idempotent; a no-op on finished coroutines.
    pub(crate) fn request_cancel(&self) {
        if matches!(self.state.get(), State::Finished | State::Cancelled) {
            return;
        }

        if self.cancel_requested.replace(true) {
            return;
        }

        tracing::trace!(id = self.id, "cancel requested");

        let site = mem::replace(&mut *self.wait.borrow_mut(), WaitSite::None);
        match site {
            WaitSite::None => {}
            WaitSite::Timer(timer) => timer.cancel(),
            WaitSite::Channel { core, timer } => {
                core.revoke();
                if let Some(timer) = timer {
                    timer.cancel();
                }
            }
            WaitSite::Fd { fd, event, timer } => {
                if let Some(timer) = timer {
                    timer.cancel();
                }
                if let Some(shared) = self.sched.upgrade() {
                    shared.with_reactor(|reactor| reactor.remove_waiter(fd, event, self.id));
                }
            }
        }

        self.wake.wake();
    }
}

/// Handle to a spawned coroutine.
///
/// The handle shares ownership of the coroutine's control cell with the
/// runtime; it remains valid after the coroutine finishes, at which
/// point it is a non-running reference usable only for the idempotent
/// [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct Coroutine {
    pub(crate) cell: Rc<CoroCell>,
}

impl Coroutine {
    /// Process-unique id of the coroutine.
    pub fn id(&self) -> u64 {
        self.cell.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.cell.state()
    }

    /// Requests cancellation of the coroutine.
    ///
    /// The request is asynchronous: the flag is set, the coroutine is
    /// removed from its wait structure and re-enqueued, and the call
    /// returns immediately. The target observes the request at its next
    /// suspension point, where the blocking operation fails with
    /// [`Error::CanceledCoroutine`]. Cancelling twice, or cancelling a
    /// finished coroutine, is a no-op.
    pub fn cancel(&self) {
        self.cell.request_cancel();
    }
}

/// Spawns a coroutine running `body` concurrently with its spawner.
///
/// The coroutine is enqueued at the tail of the ready queue; the caller
/// continues running. There is no implicit join: coordinate through a
/// [`Channel`](crate::channel::Channel) or cancel through the returned
/// handle. An error escaping `body` terminates only that coroutine.
///
/// # Errors
///
/// Fails with [`Error::CanceledCoroutine`] when called from a coroutine
/// that has itself been cancelled.
///
/// # Panics
///
/// Panics when called outside of a running runtime.
pub fn spawn<F>(body: F) -> Result<Coroutine>
where
    F: Future<Output = Result<()>> + 'static,
{
    context::with_scheduler(|shared| {
        if let Some(current) = context::try_current_coroutine() {
            if current.cancel_requested() {
                return Err(Error::CanceledCoroutine);
            }
        }

        Ok(spawn_on(shared, body))
    })
}

/// Spawns `body` on a specific scheduler. Shared by [`spawn`] and
/// [`Runtime::spawn`](crate::runtime::Runtime::spawn).
pub(crate) fn spawn_on<F>(shared: &Rc<Shared>, body: F) -> Coroutine
where
    F: Future<Output = Result<()>> + 'static,
{
    let cell = scheduler::new_cell(shared);

    let wrapped = {
        let cell = cell.clone();
        async move {
            if let Err(err) = body.await {
                match err {
                    Error::CanceledCoroutine => cell.set_state(State::Cancelled),
                    other => {
                        tracing::debug!(id = cell.id(), error = %other, "coroutine terminated with error");
                    }
                }
            }
        }
    };

    scheduler::install(shared, cell.clone(), Box::pin(wrapped));

    Coroutine { cell }
}

/// An unordered collection of coroutine handles cancelled as a unit.
///
/// # Examples
///
/// ```rust,ignore
/// let group = Group::new();
/// group.add_coroutine(async { worker().await })?;
/// group.add_coroutine(async { worker().await })?;
/// group.cancel();
/// ```
pub struct Group {
    children: RefCell<Vec<Coroutine>>,
}

impl Group {
    pub fn new() -> Self {
        Self {
            children: RefCell::new(Vec::new()),
        }
    }

    /// Spawns `body` and retains the handle in the group.
    ///
    /// Returns a clone of the handle, subject to the same rules as
    /// [`spawn`].
    pub fn add_coroutine<F>(&self, body: F) -> Result<Coroutine>
    where
        F: Future<Output = Result<()>> + 'static,
    {
        let handle = spawn(body)?;
        self.children.borrow_mut().push(handle.clone());
        Ok(handle)
    }

    /// Cancels every retained coroutine and clears the collection.
    pub fn cancel(&self) {
        for child in self.children.borrow_mut().drain(..) {
            child.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}
