use crate::queue::errors::QueueError;
use crate::queue::monitor::{MAX_MONITORS, MonitorToken};
use crate::queue::pool::{PoolConfig, ThreadPool};
use crate::queue::port::{DispatchMode, Port, Ports};
use crate::queue::shared::Shared;
use crate::utils::thread::ThreadNameFn;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A reference-counted handle to a task queue with two ports, [`Port::Work`]
/// and [`Port::Completion`].
///
/// Cloning a handle (see [`TaskQueue::duplicate`]) yields another handle to
/// the same ports. Each handle may be closed independently; the queue keeps
/// running while at least one handle is alive. When the last handle is
/// closed, the queue terminates: items still pending are dropped without
/// running, and the thread pool, if any, shuts down.
#[derive(Clone)]
pub struct TaskQueue(Arc<Handle>);

/// Closing the last handle terminates the queue.
struct Handle {
    shared: Arc<Shared>,
    pool: Option<ThreadPool>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.terminate();

        if let Some(pool) = self.pool.take()
            && let Err(e) = pool.join_all()
        {
            tracing::error!(error = %e, "task queue thread pool did not shut down cleanly");
        }
    }
}

impl TaskQueue {
    /// Creates a queue with default settings. See [`QueueBuilder`] for thread
    /// pool tuning.
    pub fn new(
        work_mode: DispatchMode,
        completion_mode: DispatchMode,
    ) -> Result<TaskQueue, QueueError> {
        Self::builder(work_mode, completion_mode).try_build()
    }

    pub fn builder(work_mode: DispatchMode, completion_mode: DispatchMode) -> QueueBuilder {
        QueueBuilder::new(work_mode, completion_mode)
    }

    /// Returns a new handle to the same queue.
    pub fn duplicate(&self) -> TaskQueue {
        self.clone()
    }

    /// Releases this handle. Terminates the queue if it was the last one.
    pub fn close(self) {}

    /// Number of live handles to this queue.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles refer to the same underlying queue.
    pub fn ptr_eq(&self, other: &TaskQueue) -> bool {
        Arc::ptr_eq(&self.0.shared, &other.0.shared)
    }

    pub fn dispatch_mode(&self, port: Port) -> DispatchMode {
        self.0.shared.port(port).mode()
    }

    /// Registers `callback` to be invoked every time an item is queued on one
    /// of `ports`. The callback runs on the thread queuing the item.
    ///
    /// Ports in [`DispatchMode::Automatic`] never queue anything, so monitors
    /// never fire for them.
    pub fn register_monitor<F>(&self, ports: Ports, callback: F) -> Result<MonitorToken, QueueError>
    where
        F: Fn(Port) + Send + Sync + 'static,
    {
        self.0.shared.register_monitor(ports, Arc::new(callback))
    }

    /// Returns `false` if `token` was not registered on this queue.
    pub fn unregister_monitor(&self, token: MonitorToken) -> bool {
        self.0.shared.monitors.unregister(token)
    }

    /// Queues `callback` on `port`, or runs it immediately if the port is in
    /// [`DispatchMode::Automatic`].
    pub fn submit_callback<F>(&self, port: Port, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.shared.submit(port, Box::new(callback))
    }

    /// Runs at most one item from `port` on the calling thread.
    ///
    /// With a zero `timeout` this only polls. Otherwise it waits up to
    /// `timeout` for an item to be queued. Returns whether an item was run.
    pub fn dispatch(&self, port: Port, timeout: Duration) -> bool {
        self.0.shared.dispatch(port, timeout)
    }

    pub fn len(&self, port: Port) -> usize {
        self.0.shared.port(port).len()
    }

    pub fn is_empty(&self, port: Port) -> bool {
        self.0.shared.port(port).is_empty()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.0.shared
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("work", self.0.shared.port(Port::Work))
            .field("completion", self.0.shared.port(Port::Completion))
            .field("handles", &self.handle_count())
            .field("pooled", &self.0.pool.as_ref().map(|p| p.ports()))
            .finish()
    }
}

/// Configures and creates a [`TaskQueue`].
#[derive(Debug)]
pub struct QueueBuilder {
    work_mode: DispatchMode,

    completion_mode: DispatchMode,

    /// Workers in the thread pool. Defaults to one per core. Only used when a
    /// port is in [`DispatchMode::ThreadPool`].
    pool_threads: Option<usize>,

    thread_name: ThreadNameFn,

    thread_stack_size: Option<usize>,

    max_monitors: usize,
}

impl QueueBuilder {
    fn new(work_mode: DispatchMode, completion_mode: DispatchMode) -> Self {
        Self {
            work_mode,
            completion_mode,
            pool_threads: None,
            thread_name: ThreadNameFn::counting("dispatchq-pool"),
            thread_stack_size: None,
            max_monitors: MAX_MONITORS,
        }
    }

    #[track_caller]
    pub fn pool_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "pool_threads must be greater than 0");
        self.pool_threads = Some(val);
        self
    }

    /// Sets the name of the thread pool workers.
    ///
    /// The default name is "dispatchq-pool-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        self.thread_name = ThreadNameFn::fixed(val.into());
        self
    }

    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    pub fn thread_stack_size(mut self, val: usize) -> Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// How many monitors may be registered at once. Defaults to 32.
    pub fn max_monitors(mut self, val: usize) -> Self {
        self.max_monitors = val;
        self
    }

    pub fn try_build(self) -> Result<TaskQueue, QueueError> {
        let shared = Arc::new(Shared::new(
            self.work_mode,
            self.completion_mode,
            self.max_monitors,
        ));

        let pooled = shared.pooled_ports();
        let pool = if pooled.is_empty() {
            None
        } else {
            let cfg = PoolConfig {
                threads: self
                    .pool_threads
                    .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get())),
                thread_name: self.thread_name,
                thread_stack_size: self.thread_stack_size,
            };

            match ThreadPool::spawn(&shared, pooled, &cfg) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    // Releases the workers that did start.
                    shared.terminate();
                    return Err(e);
                }
            }
        };

        Ok(TaskQueue(Arc::new(Handle { shared, pool })))
    }
}
