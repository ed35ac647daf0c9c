/// An I/O event reported by the poller.
///
/// Readiness information for one registered file descriptor, produced by
/// the platform poller and consumed by the reactor to wake the waiting
/// coroutines.
pub(crate) struct Event {
    /// Token identifying the waiter-table entry of the descriptor.
    pub(crate) token: usize,

    /// The descriptor is readable (or in an error/hang-up state that a
    /// read would observe).
    pub(crate) readable: bool,

    /// The descriptor is writable.
    pub(crate) writable: bool,
}
