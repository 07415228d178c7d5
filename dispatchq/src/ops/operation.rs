use crate::ops::errors::AsyncError;
use crate::queue::{Callback, Port, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

pub(crate) type CompletionFn<T> = Box<dyn FnOnce(Result<T, AsyncError>) + Send + 'static>;

/// Where an operation stands. Transitions only move forward:
///
/// ```text
/// Pending ──► Running ──► Completed
///    │
///    └──────► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AsyncStatus {
    /// The work item is queued and has not been dispatched yet.
    Pending = 0,

    /// The work item was dispatched. Its completion may still be waiting on
    /// the Completion port.
    Running = 1,

    /// The completion callback has been invoked.
    Completed = 2,

    /// Canceled before the work item was dispatched.
    Canceled = 3,
}

impl AsyncStatus {
    fn from_u8(val: u8) -> Self {
        match val {
            0 => AsyncStatus::Pending,
            1 => AsyncStatus::Running,
            2 => AsyncStatus::Completed,
            _ => AsyncStatus::Canceled,
        }
    }
}

/// Type-erased view of an [`Operation`] for handles.
pub(crate) trait OperationControl: Send + Sync {
    fn cancel(self: Arc<Self>) -> bool;

    fn status(&self) -> AsyncStatus;
}

/// State shared between an operation's work item, its completion and its
/// [`AsyncHandle`](crate::ops::AsyncHandle).
///
/// Holds the queue storage rather than a [`TaskQueue`](crate::queue::TaskQueue)
/// handle: pending operations must not keep the queue from terminating.
pub(crate) struct Operation<T> {
    status: AtomicU8,

    // Taken exactly once, by whichever of completion or cancellation gets
    // there first.
    completion: Mutex<Option<CompletionFn<T>>>,

    shared: Arc<Shared>,
}

impl<T: Send + 'static> Operation<T> {
    pub(crate) fn new(shared: Arc<Shared>, completion: CompletionFn<T>) -> Self {
        Self {
            status: AtomicU8::new(AsyncStatus::Pending as u8),
            completion: Mutex::new(Some(completion)),
            shared,
        }
    }

    fn transition(&self, from: AsyncStatus, to: AsyncStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims the right to run the work. Fails if the operation was canceled.
    pub(crate) fn start(&self) -> bool {
        self.transition(AsyncStatus::Pending, AsyncStatus::Running)
    }

    /// Queues the completion callback with `result` on the Completion port.
    pub(crate) fn complete(self: &Arc<Self>, result: Result<T, AsyncError>) {
        let Some(completion) = self.completion.lock().take() else {
            return;
        };

        let op = Arc::clone(self);
        let callback: Callback = Box::new(move || {
            // A canceled operation stays canceled.
            op.transition(AsyncStatus::Running, AsyncStatus::Completed);
            completion(result);
        });

        if let Err(e) = self.shared.submit(Port::Completion, callback) {
            tracing::debug!(error = %e, "dropping operation completion");
        }
    }
}

impl<T: Send + 'static> OperationControl for Operation<T> {
    fn cancel(self: Arc<Self>) -> bool {
        let canceled = self.transition(AsyncStatus::Pending, AsyncStatus::Canceled);
        if canceled {
            self.complete(Err(AsyncError::Canceled));
        }
        canceled
    }

    fn status(&self) -> AsyncStatus {
        AsyncStatus::from_u8(self.status.load(Ordering::Acquire))
    }
}
