use crate::error::Error;
use crate::io::PollEvent;
use crate::reactor::event::Event;
use crate::reactor::poller::common::Interest;
use crate::reactor::poller::{Poller, Waker as PollerWaker};

use slab::Slab;
use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;
use std::time::Duration;

/// Shared record of one pending poll, owned jointly by the reactor entry
/// and the polling future.
///
/// The reactor flips `ready` when the kernel reports readiness;
/// [`FileDescriptor::clean`](crate::io::FileDescriptor::clean) flips
/// `cleaned` when the descriptor's bookkeeping is torn down under a
/// waiting coroutine.
pub(crate) struct PollWaiter {
    pub(crate) ready: Cell<bool>,
    pub(crate) cleaned: Cell<bool>,
}

impl PollWaiter {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            ready: Cell::new(false),
            cleaned: Cell::new(false),
        })
    }
}

/// The single coroutine waiting for one readiness direction.
struct DirWaiter {
    coro: u64,
    waiter: Rc<PollWaiter>,
    waker: Waker,
}

/// Waiter-table entry for one registered descriptor.
///
/// Invariant: at most one coroutine per direction. A second waiter for
/// an occupied direction is rejected before anything is registered.
struct FdEntry {
    fd: RawFd,
    read: Option<DirWaiter>,
    write: Option<DirWaiter>,
}

impl FdEntry {
    fn interest(&self) -> Interest {
        Interest {
            read: self.read.is_some(),
            write: self.write.is_some(),
        }
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

/// The I/O reactor: platform poller plus the waiter table.
///
/// All mutation happens on the scheduler thread; the only cross-thread
/// surface is the poller's wake signal.
pub(crate) struct Reactor {
    poller: Poller,
    entries: Slab<FdEntry>,
    by_fd: HashMap<RawFd, usize>,
}

impl Reactor {
    pub(crate) fn new(event_capacity: usize) -> Self {
        Self {
            poller: Poller::new(event_capacity),
            entries: Slab::new(),
            by_fd: HashMap::new(),
        }
    }

    /// The poller's wake signal, shared with the injector so foreign
    /// threads can interrupt a blocking poll.
    pub(crate) fn waker(&self) -> Arc<PollerWaker> {
        self.poller.waker()
    }

    /// Whether no coroutine is waiting on any descriptor.
    pub(crate) fn is_idle(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `coro` as the sole waiter for `(fd, event)` and registers
    /// the descriptor with the kernel.
    ///
    /// # Errors
    ///
    /// - [`Error::FileDescriptorBlockedInAnotherCoroutine`] if another
    ///   coroutine already waits for this direction.
    /// - [`Error::OutOfMemory`] or [`Error::InvalidFileDescriptor`] if
    ///   the kernel refuses the registration.
    pub(crate) fn register_waiter(
        &mut self,
        fd: RawFd,
        event: PollEvent,
        coro: u64,
        waiter: Rc<PollWaiter>,
        waker: Waker,
    ) -> Result<(), Error> {
        if let Some(&token) = self.by_fd.get(&fd) {
            let entry = &mut self.entries[token];
            let slot = match event {
                PollEvent::Read => &mut entry.read,
                PollEvent::Write => &mut entry.write,
            };

            if let Some(existing) = slot {
                if existing.coro != coro {
                    return Err(Error::FileDescriptorBlockedInAnotherCoroutine);
                }
            }

            *slot = Some(DirWaiter { coro, waiter, waker });
            let interest = entry.interest();

            if let Err(err) = self.poller.reregister(fd, token, interest) {
                self.drop_waiter(token, event);
                return Err(map_ctl_error(err));
            }

            return Ok(());
        }

        let mut entry = FdEntry {
            fd,
            read: None,
            write: None,
        };
        match event {
            PollEvent::Read => entry.read = Some(DirWaiter { coro, waiter, waker }),
            PollEvent::Write => entry.write = Some(DirWaiter { coro, waiter, waker }),
        }
        let interest = entry.interest();

        let token = self.entries.insert(entry);
        if let Err(err) = self.poller.register(fd, token, interest) {
            self.entries.remove(token);
            return Err(map_ctl_error(err));
        }

        self.by_fd.insert(fd, token);
        Ok(())
    }

    /// Forgets the waiter `coro` recorded for `(fd, event)`.
    ///
    /// No-op when the waiter is absent or belongs to another coroutine,
    /// so cancellation and timeout cleanup may race harmlessly.
    pub(crate) fn remove_waiter(&mut self, fd: RawFd, event: PollEvent, coro: u64) {
        let Some(&token) = self.by_fd.get(&fd) else {
            return;
        };

        {
            let entry = &mut self.entries[token];
            let slot = match event {
                PollEvent::Read => &mut entry.read,
                PollEvent::Write => &mut entry.write,
            };

            match slot {
                Some(waiter) if waiter.coro == coro => *slot = None,
                _ => return,
            }
        }

        self.shrink(token);
    }

    /// Releases all bookkeeping for `fd` without closing it.
    ///
    /// Coroutines still waiting on the descriptor are resumed and fail
    /// with [`Error::CanceledCoroutine`].
    pub(crate) fn clean(&mut self, fd: RawFd) {
        let Some(token) = self.by_fd.remove(&fd) else {
            return;
        };

        let entry = self.entries.remove(token);
        self.poller.deregister(fd);

        for dir in [entry.read, entry.write].into_iter().flatten() {
            dir.waiter.cleaned.set(true);
            dir.waker.wake();
        }
    }

    /// Blocks until readiness, a wake signal, or the timeout.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        self.poller.poll(events, timeout)
    }

    /// Wakes the waiters satisfied by `event` and deregisters the
    /// directions that were woken.
    pub(crate) fn complete(&mut self, event: Event) {
        let Some(entry) = self.entries.get_mut(event.token) else {
            // Stale event for a descriptor deregistered this tick.
            return;
        };

        if event.readable {
            if let Some(dir) = entry.read.take() {
                dir.waiter.ready.set(true);
                dir.waker.wake();
            }
        }

        if event.writable {
            if let Some(dir) = entry.write.take() {
                dir.waiter.ready.set(true);
                dir.waker.wake();
            }
        }

        self.shrink(event.token);
    }

    /// Drops an entry that lost its last waiter, or narrows the kernel
    /// registration to the directions still waited on.
    fn shrink(&mut self, token: usize) {
        let (fd, empty, interest) = {
            let entry = &self.entries[token];
            (entry.fd, entry.is_empty(), entry.interest())
        };

        if empty {
            self.poller.deregister(fd);
            self.entries.remove(token);
            self.by_fd.remove(&fd);
        } else {
            let _ = self.poller.reregister(fd, token, interest);
        }
    }

    fn drop_waiter(&mut self, token: usize, event: PollEvent) {
        {
            let entry = &mut self.entries[token];
            match event {
                PollEvent::Read => entry.read = None,
                PollEvent::Write => entry.write = None,
            }
        }
        self.shrink(token);
    }
}

/// Maps a registration errno onto the runtime error kinds: exhausted
/// kernel memory stays distinguishable from an unregistrable descriptor.
fn map_ctl_error(err: io::Error) -> Error {
    match err.raw_os_error() {
        Some(libc::ENOMEM) | Some(libc::ENOSPC) => Error::OutOfMemory,
        _ => {
            tracing::debug!(%err, "descriptor registration rejected");
            Error::InvalidFileDescriptor
        }
    }
}
