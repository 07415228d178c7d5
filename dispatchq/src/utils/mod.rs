pub(crate) mod panic;
pub(crate) use panic::panic_message;

pub(crate) mod scope_guard;
pub(crate) use scope_guard::ScopeGuard;

pub(crate) mod thread;
