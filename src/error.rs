use thiserror::Error;

/// Boxed error payload carried through a channel by
/// [`Channel::send_error`](crate::channel::Channel::send_error).
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by runtime operations.
///
/// Every blocking primitive reports its failure through this enum; the
/// runtime never swallows an error. An error escaping a coroutine body
/// terminates only that coroutine.
#[derive(Debug, Error)]
pub enum Error {
    /// A suspension-point operation observed a cancel request.
    #[error("coroutine was canceled")]
    CanceledCoroutine,

    /// The deadline of a blocking operation elapsed.
    #[error("operation timed out")]
    Timeout,

    /// A send or receive was attempted on a terminated channel.
    #[error("channel is done")]
    DoneChannel,

    /// The file descriptor is negative or could not be registered with
    /// the readiness multiplexer.
    #[error("invalid file descriptor")]
    InvalidFileDescriptor,

    /// Another coroutine is already waiting for the same readiness
    /// direction on this file descriptor.
    #[error("file descriptor blocked in another coroutine")]
    FileDescriptorBlockedInAnotherCoroutine,

    /// The kernel refused a runtime-side allocation.
    #[error("out of memory")]
    OutOfMemory,

    /// An application error transported through a channel.
    ///
    /// Produced by [`Channel::receive`](crate::channel::Channel::receive)
    /// when the paired sender used
    /// [`Channel::send_error`](crate::channel::Channel::send_error); the
    /// original error is re-raised unchanged.
    #[error(transparent)]
    Transported(BoxedError),
}
