use std::os::fd::RawFd;

/// Readiness directions a descriptor is registered for.
#[derive(Clone, Copy)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

/// Wake signal for a blocking poll, backed by a platform descriptor
/// (an eventfd on Linux, the kqueue itself elsewhere).
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
