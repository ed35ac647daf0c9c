//! Linux `epoll` poller backend.
//!
//! Responsibilities:
//! - register file descriptors with read/write interests,
//! - block until readiness, a timer-bounded timeout, or a wake signal,
//! - report registration failures instead of asserting (`EBADF` and
//!   friends become invalid-descriptor errors upstream).
//!
//! Level-triggered semantics; the reactor deregisters a direction as
//! soon as its waiter is woken.

use super::common::{Interest, Waker};
use crate::reactor::event::Event;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token for the internal wake event.
///
/// Waiter-table tokens are small slab indices, so `u64::MAX` can never
/// collide with one.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// Owns the epoll instance, an `eventfd` wake signal registered as a
/// persistent read source, and a reusable event buffer. The wake signal
/// lets wakers that migrated to other threads interrupt a blocking
/// `epoll_wait`.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Waker wrapping the internal eventfd.
    waker: Arc<Waker>,
}

unsafe impl Send for EpollPoller {}

impl Waker {
    /// Interrupts a blocking `epoll_wait` by writing to the eventfd.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }
}

impl EpollPoller {
    /// Creates the epoll instance and its eventfd wake source.
    ///
    /// `capacity` sizes the event buffer handed to `epoll_wait`.
    pub(crate) fn new(capacity: usize) -> Self {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        assert!(epoll >= 0, "epoll_create1 failed");

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        assert!(eventfd >= 0, "eventfd failed");

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) };
        assert!(rc == 0, "failed to register wake eventfd");

        Self {
            epoll,
            events: Vec::with_capacity(capacity),
            waker: Arc::new(Waker(eventfd)),
        }
    }

    /// Returns the shared wake signal.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Registers a file descriptor.
    ///
    /// Errors are returned rather than asserted: a descriptor the kernel
    /// rejects must surface as an error on the polling coroutine.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token, interest)
    }

    /// Updates the interest set of an already registered descriptor.
    pub(crate) fn reregister(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, token, interest)
    }

    /// Removes a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let mut flags = 0;

        if interest.read {
            flags |= EPOLLIN;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Blocks until readiness, the wake signal, or the timeout.
    ///
    /// The timeout is rounded **up** to the next millisecond so a timer
    /// a fraction of a millisecond away does not spin through zero-length
    /// waits.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let timeout_ms = timeout.map(millis_at_least).unwrap_or(-1);

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                unsafe {
                    self.events.set_len(0);
                }
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        events.clear();

        for ev in &self.events {
            if ev.u64 == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut buf as *mut _ as *mut _, 8);
                }
                continue;
            }

            let token = ev.u64 as usize;

            let readable = ev.events & ((EPOLLIN | EPOLLERR | EPOLLHUP) as u32) != 0;
            let writable = ev.events & ((EPOLLOUT | EPOLLERR | EPOLLHUP) as u32) != 0;

            if let Some(e) = events.iter_mut().find(|e| e.token == token) {
                e.readable |= readable;
                e.writable |= writable;
            } else {
                events.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.waker.0);
            libc::close(self.epoll);
        }
    }
}

/// Converts a timeout to whole milliseconds, rounding up, saturating
/// into the positive `i32` range epoll accepts.
fn millis_at_least(timeout: Duration) -> i32 {
    let millis = timeout.as_millis();
    let rounded = if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    };

    rounded.min(i32::MAX as u128) as i32
}
