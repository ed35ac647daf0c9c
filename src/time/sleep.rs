use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::coroutine::{CoroCell, WaitSite};
use crate::reactor::timer::TimerHandle;
use crate::time::Deadline;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Suspends the current coroutine until `deadline` is reached.
///
/// This is the sleep primitive of the runtime: a combined "yield and
/// sleep-until". The coroutine always goes through at least one
/// scheduling round, even when the deadline already lies in the past.
/// A [`Deadline::never`] parks the coroutine until it is cancelled.
///
/// # Errors
///
/// Fails with [`Error::CanceledCoroutine`] when a cancel request is
/// observed, either on entry or while suspended.
///
/// # Panics
///
/// Panics if polled outside of a running coroutine.
pub fn sleep_until(deadline: Deadline) -> Sleep {
    Sleep::new(deadline)
}

/// Suspends the current coroutine for `duration`.
///
/// Convenience over [`sleep_until`] with a deadline `duration` from now.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(Deadline::after(duration))
}

/// Future returned by [`sleep`] and [`sleep_until`].
///
/// On first poll the timer is registered with the scheduler; resuming on
/// timer expiry is the normal return path. Dropping the future before
/// completion cancels the timer entry so no spurious wake-up occurs.
pub struct Sleep {
    /// Absolute point in time when the sleep completes.
    deadline: Deadline,

    /// Whether the coroutine has already parked once.
    parked: bool,

    /// Handle to the armed timer entry, if any.
    timer: Option<TimerHandle>,
}

impl Sleep {
    pub(crate) fn new(deadline: Deadline) -> Self {
        Self {
            deadline,
            parked: false,
            timer: None,
        }
    }

    /// Cancels the timer entry and clears the coroutine's wait reason.
    fn detach(&mut self, coro: &Rc<CoroCell>) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        coro.clear_wait();
    }
}

impl Future for Sleep {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let coro = context::current_coroutine();

        // A cancel request wins over every other resumption path.
        if coro.cancel_requested() {
            this.detach(&coro);
            return Poll::Ready(Err(Error::CanceledCoroutine));
        }

        if !this.parked {
            this.parked = true;

            if let Some(instant) = this.deadline.instant() {
                let timer = context::with_scheduler(|shared| shared.arm_timer(instant, cx.waker()));
                coro.set_wait(WaitSite::Timer(timer.clone()));
                this.timer = Some(timer);
            }

            return Poll::Pending;
        }

        if this.deadline.elapsed_at(Instant::now()) {
            this.detach(&coro);
            return Poll::Ready(Ok(()));
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    /// Cancels the timer if the sleep is dropped before completion.
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}
