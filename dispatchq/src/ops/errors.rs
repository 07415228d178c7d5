/// Why an asynchronous operation produced no value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsyncError {
    /// [`AsyncHandle::cancel`](crate::ops::AsyncHandle::cancel) won the race
    /// against the work item being dispatched. The work never ran.
    #[error("Operation was canceled before it started")]
    Canceled,

    /// The work item panicked. The panic was caught on the dispatching thread.
    #[error("Operation panicked: {0}")]
    Panicked(String),
}

impl AsyncError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, AsyncError::Canceled)
    }
}
