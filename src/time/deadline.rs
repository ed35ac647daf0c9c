use std::time::{Duration, Instant};

/// An absolute point on the monotonic clock.
///
/// Every blocking operation of the runtime accepts a `Deadline` bounding
/// how long it may stay suspended. Two sentinels cover the edges of the
/// range:
///
/// - [`Deadline::never`]: no timer is armed; the operation waits
///   indefinitely.
/// - [`Deadline::immediate`]: the deadline has already passed; the
///   operation still suspends for one scheduling round before reporting
///   [`Timeout`](crate::Error::Timeout), so yield semantics are preserved.
///
/// A relative timeout converts via [`Deadline::after`] or plain `.into()`:
///
/// ```rust,ignore
/// channel.send(42, Duration::from_millis(100).into()).await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never arrives.
    pub fn never() -> Self {
        Self(None)
    }

    /// A deadline that has already passed.
    ///
    /// Blocking operations with an immediate deadline poll once: they
    /// either complete right away or fail with
    /// [`Timeout`](crate::Error::Timeout) after a single scheduling round.
    pub fn immediate() -> Self {
        Self(Some(Instant::now()))
    }

    /// The deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    /// The deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// The underlying instant, or `None` for [`Deadline::never`].
    pub(crate) fn instant(self) -> Option<Instant> {
        self.0
    }

    /// Whether the deadline lies at or before `now`.
    pub(crate) fn elapsed_at(self, now: Instant) -> bool {
        matches!(self.0, Some(deadline) if deadline <= now)
    }
}

impl From<Duration> for Deadline {
    /// Converts a relative timeout into the deadline that far from now.
    fn from(duration: Duration) -> Self {
        Self::after(duration)
    }
}
