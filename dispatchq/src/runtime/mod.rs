// Public API
pub mod runtime;
pub use runtime::{AsyncQueue, Builder};

// Exports
pub(crate) use runtime::AsyncConfig;

mod drain;

mod pump;
pub(crate) use pump::PumpState;
