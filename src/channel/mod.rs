//! Synchronous rendezvous channels.
//!
//! A [`Channel`] has no buffer: every transfer pairs exactly one sender
//! with exactly one receiver. Whichever side arrives first suspends until
//! its counterpart shows up, its deadline elapses, the channel is marked
//! done, or its coroutine is cancelled. Besides values, a channel can
//! transport an error: the paired receive re-raises it unchanged.
//!
//! # Examples
//!
//! ```rust,ignore
//! let channel = Channel::new();
//!
//! spawn({
//!     let channel = channel.clone();
//!     async move { channel.send(42, Deadline::never()).await }
//! })?;
//!
//! let value = channel.receive(Deadline::never()).await?;
//! assert_eq!(value, 42);
//! ```

use crate::error::{BoxedError, Error, Result};
use crate::reactor::timer::TimerHandle;
use crate::runtime::context;
use crate::runtime::coroutine::{CoroCell, WaitSite};
use crate::time::Deadline;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

/// Progress of one queued channel waiter.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WaiterStatus {
    /// Still queued, no counterpart yet.
    Waiting,

    /// The rendezvous completed; the payload changed hands.
    Delivered,

    /// The channel was marked done while the waiter was queued.
    Closed,

    /// The waiter withdrew (cancel or timeout); queue scans skip it.
    Revoked,
}

/// Type-erased half of a queued waiter, shared with the owning
/// coroutine's wait reason so cancellation can revoke the waiter without
/// knowing the channel's value type.
pub(crate) struct WaiterCore {
    status: Cell<WaiterStatus>,
    waker: RefCell<Option<Waker>>,
}

impl WaiterCore {
    fn new(waker: Waker) -> Rc<Self> {
        Rc::new(Self {
            status: Cell::new(WaiterStatus::Waiting),
            waker: RefCell::new(Some(waker)),
        })
    }

    fn status(&self) -> WaiterStatus {
        self.status.get()
    }

    fn set_waker(&self, waker: &Waker) {
        *self.waker.borrow_mut() = Some(waker.clone());
    }

    /// Marks the waiter withdrawn. Only a waiting waiter can be revoked.
    pub(crate) fn revoke(&self) {
        if self.status.get() == WaiterStatus::Waiting {
            self.status.set(WaiterStatus::Revoked);
        }
    }

    /// Resolves the waiter and wakes its coroutine.
    fn complete(&self, status: WaiterStatus) {
        self.status.set(status);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

/// What travels through a rendezvous.
enum Payload<T> {
    Value(T),
    Failure(BoxedError),
}

/// A queued sender or receiver.
///
/// The slot is shared with the suspended party's future, so the transfer
/// is a single move between the two sides with no channel-owned buffer.
struct Waiter<T> {
    core: Rc<WaiterCore>,
    slot: Rc<RefCell<Option<Payload<T>>>>,
}

struct Inner<T> {
    done: bool,
    senders: VecDeque<Waiter<T>>,
    receivers: VecDeque<Waiter<T>>,
}

/// Pops the first waiter still actually waiting, discarding revoked and
/// otherwise resolved stragglers.
fn pop_waiting<T>(queue: &mut VecDeque<Waiter<T>>) -> Option<Waiter<T>> {
    while let Some(waiter) = queue.pop_front() {
        if waiter.core.status() == WaiterStatus::Waiting {
            return Some(waiter);
        }
    }
    None
}

/// An unbuffered rendezvous channel.
///
/// Cloning the handle is cheap and shares the same channel. All
/// operations must run on the channel's scheduler thread; a channel
/// never crosses schedulers.
pub struct Channel<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                done: false,
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
            })),
        }
    }

    /// Sends `value`, suspending until a receiver takes it.
    ///
    /// If a receiver is already queued the transfer completes without
    /// suspending (the cancel flag is still checked first). Otherwise
    /// the sender queues up in FIFO order.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`]: `deadline` elapsed with no receiver.
    /// - [`Error::DoneChannel`]: the channel is, or became, done.
    /// - [`Error::CanceledCoroutine`]: the coroutine was cancelled.
    pub fn send(&self, value: T, deadline: Deadline) -> Transfer<T> {
        Transfer::new(self.inner.clone(), Payload::Value(value), deadline)
    }

    /// Sends an error instead of a value.
    ///
    /// The rendezvous protocol is identical to [`send`](Self::send); the
    /// paired [`receive`](Self::receive) fails with
    /// [`Error::Transported`] carrying this error unchanged.
    pub fn send_error(&self, error: BoxedError, deadline: Deadline) -> Transfer<T> {
        Transfer::new(self.inner.clone(), Payload::Failure(error), deadline)
    }

    /// Receives the next value, suspending until a sender provides one.
    ///
    /// If a sender is already queued the transfer completes without
    /// suspending. A transported error is re-raised as
    /// [`Error::Transported`].
    ///
    /// # Errors
    ///
    /// Same set as [`send`](Self::send), plus [`Error::Transported`].
    pub fn receive(&self, deadline: Deadline) -> Receive<T> {
        Receive::new(self.inner.clone(), deadline)
    }

    /// Terminates the channel.
    ///
    /// Every queued sender and receiver is released and fails with
    /// [`Error::DoneChannel`], as does every later operation. Idempotent.
    pub fn done(&self) {
        let mut inner = self.inner.borrow_mut();

        if inner.done {
            return;
        }
        inner.done = true;

        let mut waiters: Vec<_> = inner.senders.drain(..).collect();
        waiters.extend(inner.receivers.drain(..));
        for waiter in waiters {
            if waiter.core.status() == WaiterStatus::Waiting {
                waiter.core.complete(WaiterStatus::Closed);
            }
        }
    }

    /// Whether [`done`](Self::done) has been called.
    pub fn is_done(&self) -> bool {
        self.inner.borrow().done
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parked-side state shared by the send and receive futures.
struct Parked<T> {
    core: Rc<WaiterCore>,
    slot: Rc<RefCell<Option<Payload<T>>>>,
    timer: Option<TimerHandle>,
}

impl<T> Parked<T> {
    /// Withdraws from the channel and detaches from the scheduler.
    fn abandon(&self, coro: &CoroCell) {
        self.core.revoke();
        self.release(coro);
    }

    fn release(&self, coro: &CoroCell) {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
        coro.clear_wait();
    }
}

/// Enqueues a waiter on `queue`, arms the deadline timer, and records
/// the wait reason on the current coroutine.
fn park<T>(
    queue: &mut VecDeque<Waiter<T>>,
    payload: Option<Payload<T>>,
    deadline: Deadline,
    coro: &CoroCell,
    cx: &Context<'_>,
) -> Parked<T> {
    let core = WaiterCore::new(cx.waker().clone());
    let slot = Rc::new(RefCell::new(payload));

    queue.push_back(Waiter {
        core: core.clone(),
        slot: slot.clone(),
    });

    let timer = deadline
        .instant()
        .map(|at| context::with_scheduler(|shared| shared.arm_timer(at, cx.waker())));

    coro.set_wait(WaitSite::Channel {
        core: core.clone(),
        timer: timer.clone(),
    });

    Parked { core, slot, timer }
}

/// Future returned by [`Channel::send`] and [`Channel::send_error`].
pub struct Transfer<T> {
    inner: Rc<RefCell<Inner<T>>>,
    deadline: Deadline,
    payload: Option<Payload<T>>,
    parked: Option<Parked<T>>,
}

impl<T> Transfer<T> {
    fn new(inner: Rc<RefCell<Inner<T>>>, payload: Payload<T>, deadline: Deadline) -> Self {
        Self {
            inner,
            deadline,
            payload: Some(payload),
            parked: None,
        }
    }
}

impl<T> Future for Transfer<T> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // No field is structurally pinned; the payload moves out freely.
        let this = unsafe { self.get_unchecked_mut() };
        let coro = context::current_coroutine();

        if coro.cancel_requested() {
            if let Some(parked) = &this.parked {
                parked.abandon(&coro);
            }
            return Poll::Ready(Err(Error::CanceledCoroutine));
        }

        if let Some(parked) = &this.parked {
            return match parked.core.status() {
                WaiterStatus::Delivered => {
                    parked.release(&coro);
                    Poll::Ready(Ok(()))
                }
                WaiterStatus::Closed => {
                    parked.release(&coro);
                    Poll::Ready(Err(Error::DoneChannel))
                }
                WaiterStatus::Revoked => {
                    parked.release(&coro);
                    Poll::Ready(Err(Error::CanceledCoroutine))
                }
                WaiterStatus::Waiting => {
                    if this.deadline.elapsed_at(Instant::now()) {
                        parked.abandon(&coro);
                        return Poll::Ready(Err(Error::Timeout));
                    }
                    parked.core.set_waker(cx.waker());
                    Poll::Pending
                }
            };
        }

        let mut inner = this.inner.borrow_mut();

        if inner.done {
            return Poll::Ready(Err(Error::DoneChannel));
        }

        // Rendezvous with the head receiver before queueing up; this is
        // what keeps at most one of the two queues populated.
        if let Some(peer) = pop_waiting(&mut inner.receivers) {
            *peer.slot.borrow_mut() = this.payload.take();
            peer.core.complete(WaiterStatus::Delivered);
            return Poll::Ready(Ok(()));
        }

        let payload = this.payload.take();
        this.parked = Some(park(&mut inner.senders, payload, this.deadline, &coro, cx));

        Poll::Pending
    }
}

impl<T> Drop for Transfer<T> {
    /// Withdraws a still-queued waiter so a later counterpart does not
    /// rendezvous with an abandoned slot.
    fn drop(&mut self) {
        if let Some(parked) = &self.parked {
            parked.core.revoke();
            if let Some(timer) = &parked.timer {
                timer.cancel();
            }
        }
    }
}

/// Future returned by [`Channel::receive`].
pub struct Receive<T> {
    inner: Rc<RefCell<Inner<T>>>,
    deadline: Deadline,
    parked: Option<Parked<T>>,
}

impl<T> Receive<T> {
    fn new(inner: Rc<RefCell<Inner<T>>>, deadline: Deadline) -> Self {
        Self {
            inner,
            deadline,
            parked: None,
        }
    }
}

/// Unwraps a delivered payload into the receive result.
fn take_delivery<T>(payload: Payload<T>) -> Result<T> {
    match payload {
        Payload::Value(value) => Ok(value),
        Payload::Failure(error) => Err(Error::Transported(error)),
    }
}

impl<T> Future for Receive<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let coro = context::current_coroutine();

        if coro.cancel_requested() {
            if let Some(parked) = &this.parked {
                parked.abandon(&coro);
            }
            return Poll::Ready(Err(Error::CanceledCoroutine));
        }

        if let Some(parked) = &this.parked {
            return match parked.core.status() {
                WaiterStatus::Delivered => {
                    parked.release(&coro);
                    let payload = parked
                        .slot
                        .borrow_mut()
                        .take()
                        .expect("delivered waiter has an empty slot");
                    Poll::Ready(take_delivery(payload))
                }
                WaiterStatus::Closed => {
                    parked.release(&coro);
                    Poll::Ready(Err(Error::DoneChannel))
                }
                WaiterStatus::Revoked => {
                    parked.release(&coro);
                    Poll::Ready(Err(Error::CanceledCoroutine))
                }
                WaiterStatus::Waiting => {
                    if this.deadline.elapsed_at(Instant::now()) {
                        parked.abandon(&coro);
                        return Poll::Ready(Err(Error::Timeout));
                    }
                    parked.core.set_waker(cx.waker());
                    Poll::Pending
                }
            };
        }

        let mut inner = this.inner.borrow_mut();

        if inner.done {
            return Poll::Ready(Err(Error::DoneChannel));
        }

        if let Some(peer) = pop_waiting(&mut inner.senders) {
            let payload = peer
                .slot
                .borrow_mut()
                .take()
                .expect("queued sender has an empty slot");
            peer.core.complete(WaiterStatus::Delivered);
            return Poll::Ready(take_delivery(payload));
        }

        this.parked = Some(park(&mut inner.receivers, None, this.deadline, &coro, cx));

        Poll::Pending
    }
}

impl<T> Drop for Receive<T> {
    fn drop(&mut self) {
        if let Some(parked) = &self.parked {
            parked.core.revoke();
            if let Some(timer) = &parked.timer {
                timer.cancel();
            }
        }
    }
}
