use super::Runtime;

/// Builder for configuring and creating a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .event_capacity(256)
///     .build();
/// ```
pub struct RuntimeBuilder {
    /// Capacity of the readiness event buffer handed to the poller.
    event_capacity: usize,
}

impl RuntimeBuilder {
    /// Creates a new `RuntimeBuilder` with default configuration.
    pub fn new() -> Self {
        Self { event_capacity: 64 }
    }

    /// Sets the capacity of the poller's event buffer.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Builds the runtime with the configured options.
    pub fn build(self) -> Runtime {
        Runtime::new(self.event_capacity)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
