//! A reference-counted task queue with a Work port and a Completion port.
//!
//! Each port is an independent FIFO with its own [`DispatchMode`]. Producers
//! on any thread queue callbacks with [`TaskQueue::submit_callback`];
//! consumers run them one at a time with [`TaskQueue::dispatch`]. Monitors
//! registered with [`TaskQueue::register_monitor`] are told about every item
//! queued, which is how an idle consumer gets woken up.

mod errors;
pub use errors::QueueError;

mod handle;
pub use handle::{QueueBuilder, TaskQueue};

mod monitor;
pub use monitor::{MonitorFn, MonitorToken};

mod pool;

mod port;
pub(crate) use port::Callback;
pub use port::{DispatchMode, Port, Ports};

mod shared;
pub(crate) use shared::Shared;
