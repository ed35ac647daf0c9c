//! Platform-specific readiness poller.
//!
//! A unified interface over the host readiness multiplexers: `epoll` on
//! Linux and `kqueue` on macOS and the BSDs. The poller blocks the
//! scheduler thread until a registered descriptor becomes ready, the
//! wake signal fires, or the timeout bounding the next timer expires.
//!
//! The concrete backend is selected at compile time.

pub(crate) mod common;

pub(crate) use common::Waker;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
mod kqueue;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub(crate) type Poller = kqueue::KqueuePoller;
