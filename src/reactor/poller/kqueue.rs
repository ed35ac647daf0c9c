//! `kqueue` poller backend for macOS and the BSDs.
//!
//! Functionally equivalent to the Linux `epoll` backend: registers
//! read/write filters per descriptor, blocks with a timer-bounded
//! timeout, and exposes an `EVFILT_USER` event as the wake signal.

use super::common::{Interest, Waker};
use crate::reactor::event::Event;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_USER, EVFILT_WRITE,
    NOTE_TRIGGER, kevent, kqueue, timespec,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

/// Ident of the user event used as the wake signal.
const WAKE_IDENT: usize = usize::MAX;

/// `kqueue` poller.
///
/// Owns the kqueue descriptor, a registered `EVFILT_USER` wake event,
/// and a reusable event buffer. The [`Waker`] holds the kqueue
/// descriptor itself; triggering the user event interrupts a blocking
/// `kevent` call from any thread.
pub(crate) struct KqueuePoller {
    /// Kqueue file descriptor.
    kq: RawFd,

    /// Reusable buffer for kernel events.
    events: Vec<libc::kevent>,

    /// Waker wrapping the kqueue descriptor.
    waker: Arc<Waker>,
}

unsafe impl Send for KqueuePoller {}

impl Waker {
    /// Interrupts a blocking `kevent` by triggering the user event.
    pub(crate) fn wake(&self) {
        let trigger = libc::kevent {
            ident: WAKE_IDENT,
            filter: EVFILT_USER,
            flags: 0,
            fflags: NOTE_TRIGGER,
            data: 0,
            udata: ptr::null_mut(),
        };

        unsafe {
            kevent(self.0, &trigger, 1, ptr::null_mut(), 0, ptr::null());
        }
    }
}

impl KqueuePoller {
    /// Creates the kqueue instance and arms the wake event.
    ///
    /// `capacity` sizes the event buffer handed to `kevent`.
    pub(crate) fn new(capacity: usize) -> Self {
        let kq = unsafe { kqueue() };
        assert!(kq >= 0, "kqueue failed");

        let wake = libc::kevent {
            ident: WAKE_IDENT,
            filter: EVFILT_USER,
            flags: EV_ADD | EV_CLEAR,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };

        let rc = unsafe { kevent(kq, &wake, 1, ptr::null_mut(), 0, ptr::null()) };
        assert!(rc == 0, "failed to register wake event");

        Self {
            kq,
            events: Vec::with_capacity(capacity),
            waker: Arc::new(Waker(kq)),
        }
    }

    /// Returns the shared wake signal.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Registers a file descriptor.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.apply(fd, token, interest)
    }

    /// Updates the interest set of an already registered descriptor.
    ///
    /// Filters the descriptor no longer needs are deleted; a delete of a
    /// filter that was never added is ignored.
    pub(crate) fn reregister(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        if !interest.read {
            self.delete(fd, EVFILT_READ);
        }
        if !interest.write {
            self.delete(fd, EVFILT_WRITE);
        }

        self.apply(fd, token, interest)
    }

    /// Removes a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        self.delete(fd, EVFILT_READ);
        self.delete(fd, EVFILT_WRITE);
    }

    fn apply(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let mut changes: [libc::kevent; 2] = unsafe { std::mem::zeroed() };
        let mut n = 0;

        if interest.read {
            changes[n] = filter_event(fd, EVFILT_READ, token);
            n += 1;
        }
        if interest.write {
            changes[n] = filter_event(fd, EVFILT_WRITE, token);
            n += 1;
        }

        if n == 0 {
            return Ok(());
        }

        let rc = unsafe { kevent(self.kq, changes.as_ptr(), n as i32, ptr::null_mut(), 0, ptr::null()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn delete(&self, fd: RawFd, filter: i16) {
        let change = libc::kevent {
            ident: fd as usize,
            filter,
            flags: EV_DELETE,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };

        unsafe {
            kevent(self.kq, &change, 1, ptr::null_mut(), 0, ptr::null());
        }
    }

    /// Blocks until readiness, the wake signal, or the timeout.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let ts = timeout.map(|t| timespec {
            tv_sec: t.as_secs() as libc::time_t,
            tv_nsec: t.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = ts.as_ref().map_or(ptr::null(), |t| t as *const _);

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let n = unsafe {
            kevent(
                self.kq,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                ts_ptr,
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
            if ev.filter == EVFILT_USER && ev.ident == WAKE_IDENT {
                continue;
            }

            let token = ev.udata as usize;
            let erred = ev.flags & (EV_ERROR | EV_EOF) != 0;
            let readable = ev.filter == EVFILT_READ || erred;
            let writable = ev.filter == EVFILT_WRITE || erred;

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

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}

fn filter_event(fd: RawFd, filter: i16, token: usize) -> libc::kevent {
    libc::kevent {
        ident: fd as usize,
        filter,
        flags: EV_ADD,
        fflags: 0,
        data: 0,
        udata: token as *mut libc::c_void,
    }
}
