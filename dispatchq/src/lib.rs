//! A two-port task queue and the adapter that drives it from an application's
//! own thread loop.
//!
//! A [`TaskQueue`] holds a Work port and a Completion port. An operation
//! submitted with [`submit`] queues its work item on the Work port; once the
//! work item has run, its completion is queued on the Completion port.
//!
//! [`AsyncQueue`] wires a queue to:
//!
//! - a background pump thread dispatching work items as soon as they are
//!   queued, when the Work port is [`DispatchMode::Manual`].
//! - drain methods running completions synchronously on the caller's thread,
//!   when the Completion port is [`DispatchMode::Manual`].
//!
//! ```no_run
//! use dispatchq::Builder;
//! use std::time::Duration;
//!
//! let async_queue = Builder::new_manual().try_build()?;
//!
//! dispatchq::submit(async_queue.queue(), || 2 + 2, |res| {
//!     println!("got {:?}", res);
//! })?;
//!
//! loop {
//!     // ... render a frame ...
//!     async_queue.drain_completion_queue_with_timeout(Duration::from_millis(2));
//! #   break;
//! }
//!
//! async_queue.cleanup()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod ops;
pub use ops::{AsyncError, AsyncHandle, AsyncStatus, submit};

pub mod queue;
pub use queue::{DispatchMode, MonitorToken, Port, Ports, QueueError, TaskQueue};

pub mod runtime;
pub use runtime::{AsyncQueue, Builder};

mod utils;

#[cfg(test)]
mod test_utils;
