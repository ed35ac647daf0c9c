use crate::error::{Error, Result};
use crate::runtime::context;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that yields execution back to the scheduler exactly once.
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = Result<()>;

    /// On the first poll the coroutine re-enqueues itself at the tail of
    /// the ready queue and suspends; on the second poll it completes.
    /// A cancel request is observed on either poll, so yielding inside a
    /// cancelled coroutine fails promptly.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let coro = context::current_coroutine();

        if coro.cancel_requested() {
            return Poll::Ready(Err(Error::CanceledCoroutine));
        }

        if !self.0 {
            self.0 = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        Poll::Ready(Ok(()))
    }
}

/// Yields execution back to the scheduler.
///
/// The current coroutine moves to the tail of the ready queue, so N
/// runnable coroutines round-robin. Yielding is a suspension point: it
/// fails with [`Error::CanceledCoroutine`] if the coroutine has been
/// cancelled, which is what lets cooperative loops terminate promptly.
///
/// # Panics
///
/// Panics when called outside of a coroutine.
///
/// # Examples
///
/// ```rust,ignore
/// while work_remaining() {
///     do_a_slice();
///     yield_now().await?;
/// }
/// ```
pub async fn yield_now() -> Result<()> {
    YieldNow(false).await
}
