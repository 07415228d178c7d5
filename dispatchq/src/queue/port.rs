use bitflags::bitflags;
use crossbeam_deque::Injector;
use std::fmt;
use std::iter;

/// A unit of work sitting in one of the queue's ports.
pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

/// The two partitions of a [`TaskQueue`](crate::queue::TaskQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// CPU-bound work queued by in-flight asynchronous operations.
    Work,

    /// Callbacks that must run on a specific thread, usually the thread
    /// driving the application's frame loop.
    Completion,
}

impl Port {
    pub(crate) const ALL: [Port; 2] = [Port::Work, Port::Completion];
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Work => f.write_str("work"),
            Port::Completion => f.write_str("completion"),
        }
    }
}

bitflags! {
    /// Set of ports, used to scope monitors and thread pool workers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Ports: u8 {
        const WORK = 1;
        const COMPLETION = 1 << 1;
    }
}

impl From<Port> for Ports {
    fn from(port: Port) -> Self {
        match port {
            Port::Work => Ports::WORK,
            Port::Completion => Ports::COMPLETION,
        }
    }
}

impl Ports {
    pub fn contains_port(&self, port: Port) -> bool {
        self.contains(port.into())
    }
}

/// How the items queued on a port get executed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Items run inline, on the thread that queues them. Nothing is ever left
    /// pending on the port.
    Automatic,

    /// Items are executed by the queue's own pool of worker threads.
    #[default]
    ThreadPool,

    /// Items wait on the port until some thread calls
    /// [`TaskQueue::dispatch`](crate::queue::TaskQueue::dispatch).
    Manual,
}

/// FIFO storage for one port. Any thread may push; consumers pop one item at
/// a time.
pub(crate) struct PortQueue {
    port: Port,
    mode: DispatchMode,
    items: Injector<Callback>,
}

impl PortQueue {
    pub(crate) fn new(port: Port, mode: DispatchMode) -> Self {
        Self {
            port,
            mode,
            items: Injector::new(),
        }
    }

    pub(crate) fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub(crate) fn push(&self, callback: Callback) {
        self.items.push(callback);
    }

    pub(crate) fn pop(&self) -> Option<Callback> {
        // `Retry` only means we raced another consumer, the item is still there.
        iter::repeat_with(|| self.items.steal())
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every pending item without running it. Returns how many were
    /// discarded.
    pub(crate) fn clear(&self) -> usize {
        iter::from_fn(|| self.pop()).count()
    }
}

impl fmt::Debug for PortQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortQueue")
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("len", &self.len())
            .finish()
    }
}
