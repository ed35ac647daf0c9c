//! Descriptor readiness polling.
//!
//! [`FileDescriptor`] wraps a host descriptor the caller owns and lets a
//! coroutine suspend until the descriptor becomes readable or writable.
//! The runtime never closes the descriptor; lifetime stays with the
//! caller, and [`FileDescriptor::clean`] releases the runtime's
//! bookkeeping when the descriptor is handed to another subsystem.
//!
//! At most one coroutine may wait per (descriptor, direction) pair; a
//! second waiter fails immediately with
//! [`Error::FileDescriptorBlockedInAnotherCoroutine`]. One readiness
//! wake-up maps to one waiting coroutine, so the runtime never has to
//! fan a kernel event out to racing waiters.

use crate::error::{Error, Result};
use crate::reactor::PollWaiter;
use crate::reactor::timer::TimerHandle;
use crate::runtime::context;
use crate::runtime::coroutine::{CoroCell, WaitSite};
use crate::time::Deadline;

use std::future::Future;
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Instant;

/// Readiness direction to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Read,
    Write,
}

/// A host file descriptor with a polling contract.
///
/// The wrapper is thin: construction performs no registration, and
/// nothing happens until [`poll`](Self::poll) suspends on readiness.
///
/// # Examples
///
/// ```rust,ignore
/// let fd = FileDescriptor::new(socket);
/// fd.poll(PollEvent::Read, Duration::from_millis(100).into()).await?;
/// // the socket now has data (or readiness) to read
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
    fd: RawFd,
}

impl FileDescriptor {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Suspends the current coroutine until the descriptor is ready in
    /// the given direction or `deadline` elapses.
    ///
    /// The registration is dropped as soon as the wait resolves, whether
    /// by readiness, timeout, or cancellation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFileDescriptor`]: negative or unregistrable
    ///   descriptor.
    /// - [`Error::FileDescriptorBlockedInAnotherCoroutine`]: another
    ///   coroutine already waits for this direction.
    /// - [`Error::Timeout`]: no readiness before the deadline.
    /// - [`Error::CanceledCoroutine`]: the coroutine was cancelled, or
    ///   the descriptor was [`clean`](Self::clean)ed mid-wait.
    ///
    /// # Panics
    ///
    /// Panics when polled outside of a coroutine.
    pub fn poll(&self, event: PollEvent, deadline: Deadline) -> PollReadiness {
        PollReadiness {
            fd: self.fd,
            event,
            deadline,
            registered: false,
            waiter: PollWaiter::new(),
            timer: None,
        }
    }

    /// Releases the runtime's bookkeeping for this descriptor without
    /// closing it.
    ///
    /// Used before handing the descriptor to another subsystem. Any
    /// coroutine still waiting on it is resumed and fails with
    /// [`Error::CanceledCoroutine`].
    ///
    /// # Panics
    ///
    /// Panics when called outside of a running runtime.
    pub fn clean(&self) {
        context::with_scheduler(|shared| {
            shared.with_reactor(|reactor| reactor.clean(self.fd));
        });
    }
}

impl AsRawFd for FileDescriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// Future returned by [`FileDescriptor::poll`].
pub struct PollReadiness {
    fd: RawFd,
    event: PollEvent,
    deadline: Deadline,
    registered: bool,
    waiter: Rc<PollWaiter>,
    timer: Option<TimerHandle>,
}

impl PollReadiness {
    /// Deregisters from the reactor and detaches from the scheduler.
    fn detach(&mut self, coro: &CoroCell) {
        if self.registered {
            self.registered = false;
            context::with_scheduler(|shared| {
                shared.with_reactor(|reactor| reactor.remove_waiter(self.fd, self.event, coro.id()));
            });
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        coro.clear_wait();
    }
}

impl Future for PollReadiness {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let coro = context::current_coroutine();

        if coro.cancel_requested() {
            this.detach(&coro);
            return Poll::Ready(Err(Error::CanceledCoroutine));
        }

        if this.waiter.cleaned.get() {
            // The reactor already dropped the waiter table entry.
            this.registered = false;
            if let Some(timer) = this.timer.take() {
                timer.cancel();
            }
            coro.clear_wait();
            return Poll::Ready(Err(Error::CanceledCoroutine));
        }

        if this.waiter.ready.get() {
            // Woken by readiness; the reactor deregistered on wake.
            this.registered = false;
            if let Some(timer) = this.timer.take() {
                timer.cancel();
            }
            coro.clear_wait();
            return Poll::Ready(Ok(()));
        }

        if !this.registered {
            if this.fd < 0 {
                return Poll::Ready(Err(Error::InvalidFileDescriptor));
            }

            let registered = context::with_scheduler(|shared| {
                shared.with_reactor(|reactor| {
                    reactor.register_waiter(
                        this.fd,
                        this.event,
                        coro.id(),
                        this.waiter.clone(),
                        cx.waker().clone(),
                    )
                })
            });

            if let Err(err) = registered {
                return Poll::Ready(Err(err));
            }
            this.registered = true;

            let timer = this
                .deadline
                .instant()
                .map(|at| context::with_scheduler(|shared| shared.arm_timer(at, cx.waker())));

            coro.set_wait(WaitSite::Fd {
                fd: this.fd,
                event: this.event,
                timer: timer.clone(),
            });
            this.timer = timer;

            return Poll::Pending;
        }

        if this.deadline.elapsed_at(Instant::now()) {
            this.detach(&coro);
            return Poll::Ready(Err(Error::Timeout));
        }

        Poll::Pending
    }
}

impl Drop for PollReadiness {
    /// Withdraws an unresolved registration if the future is abandoned.
    fn drop(&mut self) {
        if !self.registered || self.waiter.ready.get() || self.waiter.cleaned.get() {
            if let Some(timer) = self.timer.take() {
                timer.cancel();
            }
            return;
        }

        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }

        if let Some(coro) = context::try_current_coroutine() {
            context::try_with_scheduler(|shared| {
                shared.with_reactor(|reactor| reactor.remove_waiter(self.fd, self.event, coro.id()));
            });
        }
    }
}
