use crate::queue::errors::QueueError;
use crate::queue::port::{Port, Ports};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Maximum number of monitors a single queue accepts.
pub(crate) const MAX_MONITORS: usize = 32;

/// Monitors are usually one or two per queue, keep the notify path off the heap.
const INLINE_MONITORS: usize = 4;

/// Callback invoked every time an item is queued on an observed port. It runs
/// on the thread that queued the item, so it must be quick.
pub type MonitorFn = Arc<dyn Fn(Port) + Send + Sync + 'static>;

/// Identifies a monitor registration. Tokens are unique for the lifetime of
/// the process.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct MonitorToken(NonZeroU64);

impl MonitorToken {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let Some(token) = NonZeroU64::new(COUNTER.fetch_add(1, Ordering::Relaxed)) else {
            panic!("failed to generate monitor token: bitspace exhausted");
        };

        Self(token)
    }
}

impl fmt::Display for MonitorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Monitor {
    ports: Ports,
    callback: MonitorFn,
}

pub(crate) struct Monitors {
    entries: DashMap<MonitorToken, Monitor>,

    // Reserved before insert so that the limit holds under concurrent
    // registration.
    count: AtomicUsize,

    limit: usize,
}

impl Monitors {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_limit(MAX_MONITORS)
    }

    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            count: AtomicUsize::new(0),
            limit,
        }
    }

    pub(crate) fn register(
        &self,
        ports: Ports,
        callback: MonitorFn,
    ) -> Result<MonitorToken, QueueError> {
        if ports.is_empty() {
            return Err(QueueError::EmptyPortSet);
        }

        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .map_err(|_| QueueError::MonitorLimit(self.limit))?;

        let token = MonitorToken::next();
        self.entries.insert(token, Monitor { ports, callback });

        Ok(token)
    }

    pub(crate) fn unregister(&self, token: MonitorToken) -> bool {
        let removed = self.entries.remove(&token).is_some();
        if removed {
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Invokes every monitor observing `port`.
    pub(crate) fn notify(&self, port: Port) {
        // Clone the callbacks out first: a callback is free to register or
        // unregister monitors, which needs the shard write locks.
        let callbacks = self
            .entries
            .iter()
            .filter(|entry| entry.ports.contains_port(port))
            .map(|entry| Arc::clone(&entry.callback))
            .collect::<SmallVec<[MonitorFn; INLINE_MONITORS]>>();

        for callback in callbacks {
            callback(port);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
        self.count.store(0, Ordering::Release);
    }
}

impl fmt::Debug for Monitors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitors")
            .field("len", &self.len())
            .field("limit", &self.limit)
            .finish()
    }
}
