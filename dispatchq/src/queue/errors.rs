use std::io;

/// Errors produced by the task queue itself.
///
/// Dispatching never errors: an empty port is reported as `false` by
/// [`TaskQueue::dispatch`](crate::queue::TaskQueue::dispatch).
#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    /// The last handle to the queue was closed. Nothing can be queued or
    /// registered on it anymore.
    #[error("Task queue has been terminated")]
    Terminated,

    /// Every monitor slot on this queue is in use.
    #[error("Task queue monitor limit reached ({0} monitors)")]
    MonitorLimit(usize),

    /// A monitor has to observe at least one port.
    #[error("Cannot register a monitor on an empty port set")]
    EmptyPortSet,

    /// The OS refused to create a thread for the queue's thread pool.
    #[error("Failed to spawn thread pool worker: {0}")]
    ThreadSpawn(#[from] io::Error),
}

impl QueueError {
    /// Terminated queues never come back, so callers holding work for them
    /// can drop it.
    pub fn is_terminated(&self) -> bool {
        matches!(self, QueueError::Terminated)
    }
}

impl PartialEq for QueueError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Terminated, Self::Terminated) => true,
            (Self::MonitorLimit(a), Self::MonitorLimit(b)) => a == b,
            (Self::EmptyPortSet, Self::EmptyPortSet) => true,
            (Self::ThreadSpawn(a), Self::ThreadSpawn(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
