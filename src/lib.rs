//! # Corrente
//!
//! **Corrente** is a single-threaded cooperative concurrency runtime
//! built around three tightly-coupled primitives: **coroutines**
//! (cancellable, cooperatively scheduled lightweight tasks),
//! **channels** (unbuffered CSP-style rendezvous carrying values or
//! transported errors), and **descriptor polling** (suspend until a file
//! descriptor becomes readable or writable, or a deadline elapses). The
//! three share one scheduler, one timer queue, and one readiness
//! multiplexer.
//!
//! The runtime is cooperative and deterministic by construction:
//!
//! - One scheduler per [`Runtime`], bound to the thread that calls
//!   `block_on`; coroutines never migrate, so no locks guard the
//!   scheduler's state.
//! - A **FIFO ready queue** round-robins runnable coroutines; timer
//!   expirations and readiness events append to the tail in expiry and
//!   event order.
//! - Every blocking operation takes a [`Deadline`](time::Deadline) and
//!   observes **cancellation** at the suspension point, failing with
//!   [`Error::CanceledCoroutine`].
//! - Channel rendezvous pairs exactly one sender with exactly one
//!   receiver, FIFO across concurrent waiters.
//! - At most one coroutine waits per (descriptor, direction); I/O
//!   readiness comes from `epoll` on Linux and `kqueue` on macOS/BSD.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corrente::channel::Channel;
//! use corrente::time::Deadline;
//! use corrente::{RuntimeBuilder, spawn};
//!
//! let runtime = RuntimeBuilder::new().build();
//!
//! runtime.block_on(async {
//!     let channel = Channel::new();
//!
//!     spawn({
//!         let channel = channel.clone();
//!         async move { channel.send(42, Deadline::never()).await }
//!     })
//!     .unwrap();
//!
//!     let value = channel.receive(Deadline::never()).await.unwrap();
//!     assert_eq!(value, 42);
//! });
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: unbuffered rendezvous channels
//! - [`io`]: descriptor readiness polling
//! - [`time`]: deadlines and timer-driven suspension

mod error;
mod reactor;
mod runtime;

pub mod channel;
pub mod io;
pub mod time;

pub use error::{BoxedError, Error, Result};
pub use runtime::Runtime;
pub use runtime::builder::RuntimeBuilder;
pub use runtime::coroutine::{Coroutine, Group, State, spawn};
pub use runtime::yield_now::yield_now;
