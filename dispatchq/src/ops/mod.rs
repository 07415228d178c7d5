//! Asynchronous operations on top of a [`TaskQueue`].
//!
//! An operation is a pair of callbacks. The *work* runs wherever the Work port
//! dispatches it (the pump thread, a pool worker, or inline). Once it has
//! returned, the *completion* is queued on the Completion port and receives
//! the work's result. A completion is free to submit follow-up operations,
//! e.g. to fetch the next page of a paginated result.

mod errors;
pub use errors::AsyncError;

mod operation;
pub use operation::AsyncStatus;
use operation::{Operation, OperationControl};

use crate::queue::{Port, QueueError, TaskQueue};
use crate::utils::panic_message;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Submits an operation to `queue`.
///
/// `work` runs at most once: exactly once unless the operation is canceled
/// before the Work port dispatches it. `completion` runs exactly once if the
/// queue stays alive long enough to dispatch it, with either the work's
/// output or the reason there is none.
///
/// # Example
///
/// ```no_run
/// use dispatchq::Builder;
///
/// let async_queue = Builder::new_manual().try_build()?;
///
/// dispatchq::submit(
///     async_queue.queue(),
///     || 6 * 7,
///     |res| println!("answer: {:?}", res),
/// )?;
///
/// // Later, on the thread that owns completions:
/// async_queue.drain_completion_queue_until_empty();
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn submit<T, W, C>(queue: &TaskQueue, work: W, completion: C) -> Result<AsyncHandle, QueueError>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
    C: FnOnce(Result<T, AsyncError>) + Send + 'static,
{
    let op = Arc::new(Operation::new(
        Arc::clone(queue.shared()),
        Box::new(completion),
    ));

    let work_op = Arc::clone(&op);
    queue.submit_callback(Port::Work, move || {
        if !work_op.start() {
            return;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(work))
            .map_err(|payload| AsyncError::Panicked(panic_message(payload.as_ref())));

        work_op.complete(result);
    })?;

    Ok(AsyncHandle { op })
}

/// Observes and cancels a submitted operation. Dropping the handle does not
/// cancel anything.
#[derive(Clone)]
pub struct AsyncHandle {
    op: Arc<dyn OperationControl>,
}

impl AsyncHandle {
    /// Cancels the operation if its work has not been dispatched yet. The
    /// completion then receives [`AsyncError::Canceled`], still on the
    /// Completion port.
    ///
    /// Returns `false` if the work already started, or the operation was
    /// canceled before.
    pub fn cancel(&self) -> bool {
        Arc::clone(&self.op).cancel()
    }

    pub fn status(&self) -> AsyncStatus {
        self.op.status()
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.status(),
            AsyncStatus::Completed | AsyncStatus::Canceled
        )
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests;
