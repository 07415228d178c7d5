use crate::queue::errors::QueueError;
use crate::queue::monitor::{MonitorFn, MonitorToken, Monitors};
use crate::queue::port::{Callback, DispatchMode, Port, PortQueue, Ports};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Storage behind every handle of one queue. Thread pool workers and pending
/// operations keep it alive through an `Arc`, but only handles keep the queue
/// *running*: see [`Handle`](crate::queue::handle).
#[derive(Debug)]
pub(crate) struct Shared {
    work: PortQueue,

    completion: PortQueue,

    pub(crate) monitors: Monitors,

    terminated: AtomicBool,

    // Threads blocked in a timed dispatch, and idle pool workers, sleep on
    // `available` until an item is queued or the queue terminates.
    signal: Mutex<()>,
    available: Condvar,
}

impl Shared {
    pub(crate) fn new(
        work_mode: DispatchMode,
        completion_mode: DispatchMode,
        max_monitors: usize,
    ) -> Self {
        Self {
            work: PortQueue::new(Port::Work, work_mode),
            completion: PortQueue::new(Port::Completion, completion_mode),
            monitors: Monitors::with_limit(max_monitors),
            terminated: AtomicBool::new(false),
            signal: Mutex::new(()),
            available: Condvar::new(),
        }
    }

    pub(crate) fn port(&self, port: Port) -> &PortQueue {
        match port {
            Port::Work => &self.work,
            Port::Completion => &self.completion,
        }
    }

    /// Ports whose items are executed by the queue's thread pool.
    pub(crate) fn pooled_ports(&self) -> Ports {
        Port::ALL
            .into_iter()
            .filter(|p| self.port(*p).mode() == DispatchMode::ThreadPool)
            .fold(Ports::empty(), |acc, p| acc | p.into())
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn register_monitor(
        &self,
        ports: Ports,
        callback: MonitorFn,
    ) -> Result<MonitorToken, QueueError> {
        if self.is_terminated() {
            return Err(QueueError::Terminated);
        }

        self.monitors.register(ports, callback)
    }

    /// Queues `callback` on `port`, or runs it right away if the port is in
    /// [`DispatchMode::Automatic`].
    pub(crate) fn submit(&self, port: Port, callback: Callback) -> Result<(), QueueError> {
        if self.is_terminated() {
            return Err(QueueError::Terminated);
        }

        let queue = self.port(port);
        if queue.mode() == DispatchMode::Automatic {
            callback();
            return Ok(());
        }

        queue.push(callback);

        // Lost the race against `terminate`: nobody will ever dispatch this
        // item, drop it now rather than with the last `Arc<Shared>`.
        if self.is_terminated() {
            queue.clear();
            return Err(QueueError::Terminated);
        }

        self.wake_waiters();
        self.monitors.notify(port);

        Ok(())
    }

    /// Pops and runs one item from `port`. Waits up to `timeout` for an item
    /// to show up if the port is empty. Returns whether an item was run.
    pub(crate) fn dispatch(&self, port: Port, timeout: Duration) -> bool {
        let callback = match self.port(port).pop() {
            Some(callback) => Some(callback),
            None if timeout.is_zero() => None,
            None => self.wait_pop(port.into(), Instant::now().checked_add(timeout)),
        };

        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Blocks until an item is available on one of `ports`, the deadline
    /// passes, or the queue terminates. `None` deadline waits forever.
    pub(crate) fn wait_pop(&self, ports: Ports, deadline: Option<Instant>) -> Option<Callback> {
        let mut guard = self.signal.lock();

        loop {
            // Checked while holding `signal`: producers take the lock before
            // notifying, so a push can't slip in between this check and the
            // wait below.
            if self.is_terminated() {
                return None;
            }

            if let Some(callback) = self.try_pop(ports) {
                return Some(callback);
            }

            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut guard, deadline).timed_out() {
                        return (!self.is_terminated())
                            .then(|| self.try_pop(ports))
                            .flatten();
                    }
                }
                None => self.available.wait(&mut guard),
            }
        }
    }

    fn try_pop(&self, ports: Ports) -> Option<Callback> {
        Port::ALL
            .into_iter()
            .filter(|p| ports.contains_port(*p))
            .find_map(|p| self.port(p).pop())
    }

    fn wake_waiters(&self) {
        let _guard = self.signal.lock();
        self.available.notify_all();
    }

    /// Terminates the queue: pending items are dropped without running,
    /// monitors are released, and every waiter is woken up. Idempotent.
    pub(crate) fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        let dropped_work = self.work.clear();
        let dropped_completions = self.completion.clear();
        self.monitors.clear();
        self.wake_waiters();

        tracing::debug!(
            dropped_work,
            dropped_completions,
            "task queue terminated"
        );
    }
}
