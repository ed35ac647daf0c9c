use crate::reactor::Reactor;
use crate::reactor::timer::{TimerHandle, TimerQueue};
use crate::runtime::context;
use crate::runtime::coroutine::{CoroCell, State};
use crate::runtime::injector::Injector;
use crate::runtime::waker::{WakeHandle, make_waker};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Scheduler record of one live coroutine.
///
/// The future is taken out for the duration of a poll and dropped with
/// the record when the coroutine completes; the cell lives on in any
/// remaining handles.
struct CoroRecord {
    cell: Rc<CoroCell>,
    future: Option<LocalFuture>,
}

/// Scheduler state shared by the runtime handle and, through the
/// thread-local context, by every suspension primitive.
///
/// All fields except the injector are confined to the scheduler thread;
/// no locking guards them.
pub(crate) struct Shared {
    /// Cross-thread wake queue feeding the ready queue.
    injector: Arc<Injector>,

    /// FIFO of coroutines ready to run.
    ready: RefCell<VecDeque<u64>>,

    /// Live coroutines by id. Ids are assigned monotonically and never
    /// reused, so a stale wake for a completed coroutine misses here and
    /// is discarded.
    coroutines: RefCell<HashMap<u64, CoroRecord>>,

    /// Pending deadlines.
    timers: RefCell<TimerQueue>,

    /// Readiness multiplexer and descriptor waiter table.
    reactor: RefCell<Reactor>,

    /// Next coroutine id.
    next_id: Cell<u64>,
}

impl Shared {
    pub(crate) fn new(event_capacity: usize) -> Rc<Self> {
        let reactor = Reactor::new(event_capacity);
        let injector = Arc::new(Injector::new(reactor.waker()));

        Rc::new(Self {
            injector,
            ready: RefCell::new(VecDeque::new()),
            coroutines: RefCell::new(HashMap::new()),
            timers: RefCell::new(TimerQueue::new()),
            reactor: RefCell::new(reactor),
            next_id: Cell::new(0),
        })
    }

    /// Arms a timer waking `waker` at `deadline`.
    pub(crate) fn arm_timer(&self, deadline: Instant, waker: &Waker) -> TimerHandle {
        self.timers.borrow_mut().insert(deadline, waker)
    }

    /// Runs `f` against the reactor.
    pub(crate) fn with_reactor<R>(&self, f: impl FnOnce(&mut Reactor) -> R) -> R {
        f(&mut self.reactor.borrow_mut())
    }

    /// Moves every id the injector accumulated onto the ready tail, in
    /// push order. Ids of completed coroutines are discarded.
    fn drain_injector(&self) {
        let ids = self.injector.drain();
        if ids.is_empty() {
            return;
        }

        let coroutines = self.coroutines.borrow();
        let mut ready = self.ready.borrow_mut();

        for id in ids {
            if let Some(record) = coroutines.get(&id) {
                if record.cell.state() != State::Running {
                    record.cell.set_state(State::Ready);
                }
                ready.push_back(id);
            }
        }
    }

    /// Polls one coroutine.
    fn dispatch(self: &Rc<Self>, id: u64) {
        let (cell, mut future) = {
            let mut coroutines = self.coroutines.borrow_mut();
            let Some(record) = coroutines.get_mut(&id) else {
                return;
            };
            let Some(future) = record.future.take() else {
                return;
            };
            (record.cell.clone(), future)
        };

        // Release the latch before polling so wakes arriving during the
        // poll re-enqueue the coroutine.
        cell.wake_handle().clear_queued();
        cell.set_state(State::Running);
        tracing::trace!(id, "dispatch");

        let waker = make_waker(cell.wake_handle().clone());
        let mut cx = Context::from_waker(&waker);

        let previous = context::swap_current_coroutine(Some(cell.clone()));
        let poll = future.as_mut().poll(&mut cx);
        context::swap_current_coroutine(previous);

        match poll {
            Poll::Ready(()) => {
                if cell.state() != State::Cancelled {
                    cell.set_state(State::Finished);
                }
                self.coroutines.borrow_mut().remove(&id);
                tracing::trace!(id, state = ?cell.state(), "coroutine completed");
            }
            Poll::Pending => {
                cell.set_state(State::Suspended);
                if let Some(record) = self.coroutines.borrow_mut().get_mut(&id) {
                    record.future = Some(future);
                }
            }
        }
    }
}

/// Allocates the control cell for a new coroutine.
pub(crate) fn new_cell(shared: &Rc<Shared>) -> Rc<CoroCell> {
    let id = shared.next_id.get();
    shared.next_id.set(id + 1);

    let wake = WakeHandle::new(id, shared.injector.clone());
    CoroCell::new(id, wake, Rc::downgrade(shared))
}

/// Registers a coroutine with the scheduler and enqueues it.
pub(crate) fn install(shared: &Rc<Shared>, cell: Rc<CoroCell>, future: LocalFuture) {
    let id = cell.id();

    shared.coroutines.borrow_mut().insert(
        id,
        CoroRecord {
            cell: cell.clone(),
            future: Some(future),
        },
    );

    tracing::trace!(id, "coroutine spawned");
    cell.wake_handle().wake();
}

/// The scheduler run loop.
///
/// Repeats until `done` reports completion:
///
/// 1. Drain the injector onto the ready tail.
/// 2. If a coroutine is ready, dispatch the head and start over.
/// 3. Otherwise block in the reactor until the next timer deadline or a
///    readiness event, then expire elapsed timers (in deadline order)
///    and complete readiness events (in event order). Both paths push
///    wake-ups that the next iteration drains, which makes the overall
///    wake order deterministic.
///
/// Returns when the ready queue is empty and neither timers nor
/// descriptor waiters are pending: nothing the scheduler tracks could
/// wake another coroutine, so control goes back to the caller.
/// Coroutines still parked at that point (for example on a never
/// deadline with no counterpart) stay suspended in the runtime.
pub(crate) fn run(shared: &Rc<Shared>, mut done: impl FnMut() -> bool) {
    loop {
        shared.drain_injector();

        if done() {
            return;
        }

        let next = shared.ready.borrow_mut().pop_front();
        if let Some(id) = next {
            shared.dispatch(id);
            continue;
        }

        let timeout = shared
            .timers
            .borrow_mut()
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));

        if timeout.is_none() && shared.reactor.borrow().is_idle() && shared.injector.is_empty() {
            return;
        }

        // Park in the poller. The flag must be visible before the final
        // emptiness check, otherwise a foreign wake could slip between
        // the check and the blocking poll.
        shared.injector.set_parked(true);
        if !shared.injector.is_empty() {
            shared.injector.set_parked(false);
            continue;
        }

        let mut events = Vec::new();
        let poll = shared.reactor.borrow_mut().poll(&mut events, timeout);
        shared.injector.set_parked(false);

        if let Err(err) = poll {
            panic!("reactor poll failed: {err}");
        }

        shared.timers.borrow_mut().expire(Instant::now());

        for event in events {
            shared.reactor.borrow_mut().complete(event);
        }
    }
}
