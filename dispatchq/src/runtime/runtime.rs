use crate::queue::{DispatchMode, Port, Ports, TaskQueue};
use crate::runtime::drain;
use crate::runtime::pump::{Pump, PumpState};
use crate::utils::thread::{ThreadHooks, ThreadNameFn};
use anyhow::{Context, Result, anyhow};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct Builder {
    /// Dispatch mode of the Work port. In [`DispatchMode::Manual`], a
    /// background pump thread dispatches work items as they are queued.
    work_mode: DispatchMode,

    /// Dispatch mode of the Completion port. In [`DispatchMode::Manual`],
    /// completions wait for one of the `drain_*` methods of [`AsyncQueue`].
    completion_mode: DispatchMode,

    /// Name fn used for the pump thread.
    thread_name: ThreadNameFn,

    /// Stack size used for the pump thread.
    thread_stack_size: Option<usize>,

    hooks: ThreadHooks,

    /// Workers of the queue's thread pool, if a port uses one.
    pool_threads: Option<usize>,
}

impl Builder {
    /// Returns a new builder with the given dispatch mode for each port.
    ///
    /// Configuration methods can be chained on the return value.
    pub fn new(work_mode: DispatchMode, completion_mode: DispatchMode) -> Builder {
        Builder {
            work_mode,
            completion_mode,
            thread_name: ThreadNameFn::counting("dispatchq-pump"),
            thread_stack_size: None,
            hooks: ThreadHooks::default(),
            pool_threads: None,
        }
    }

    /// Both ports in [`DispatchMode::Manual`]: work is dispatched by the pump
    /// thread, completions by the application's own loop. This is the usual
    /// setup for a game or UI loop that wants completions on its thread.
    pub fn new_manual() -> Builder {
        Builder::new(DispatchMode::Manual, DispatchMode::Manual)
    }

    /// Sets the name of the pump thread.
    ///
    /// The default name is "dispatchq-pump-{id}", where id is monotonically
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

    /// Sets the stack size (in bytes) of the pump thread.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    /// Runs `f` on the pump thread before it dispatches anything. Typically
    /// used to attach the thread to a foreign runtime.
    ///
    /// [`Builder::try_build`] waits for `f` to return. If `f` panics,
    /// `try_build` fails with the panic message and the stop hook does not
    /// run.
    ///
    /// Only valid with a [`DispatchMode::Manual`] work port, no pump thread is
    /// spawned otherwise.
    pub fn on_thread_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_start = Some(Arc::new(f));
        self
    }

    /// Runs `f` on the pump thread right before it exits, after the last
    /// dispatch. Skipped if the start hook panicked.
    pub fn on_thread_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_stop = Some(Arc::new(f));
        self
    }

    /// The number of worker threads of the queue's thread pool. Only relevant
    /// when a port is in [`DispatchMode::ThreadPool`].
    ///
    /// Defaults to 1 worker per CPU core.
    #[track_caller]
    pub fn pool_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "pool_threads must be greater than 0");
        self.pool_threads = Some(val);
        self
    }

    /// Creates the queue and, if the Work port is manual, starts the pump
    /// thread.
    ///
    /// Once this returns, operations can be submitted to
    /// [`AsyncQueue::queue`]. Nothing is left running on failure.
    pub fn try_build(self) -> Result<AsyncQueue> {
        let cfg: AsyncConfig = self.try_into()?;

        let mut builder = TaskQueue::builder(cfg.work_mode, cfg.completion_mode);
        if let Some(threads) = cfg.pool_threads {
            builder = builder.pool_threads(threads);
        }
        let queue = builder.try_build().context("failed to create task queue")?;

        let state = Arc::new(PumpState::new());

        // On error `queue` is dropped here, the last handle terminates it.
        let pump = start_pump(&cfg, &queue, &state)?;

        tracing::debug!(
            work_mode = ?cfg.work_mode,
            completion_mode = ?cfg.completion_mode,
            pump = pump.is_some(),
            "async queue initialized"
        );

        Ok(AsyncQueue {
            queue,
            state,
            pump,
        })
    }
}

/// Registers the Work port monitor and spawns the pump thread. Does nothing
/// unless the Work port is manual.
pub(crate) fn start_pump(
    cfg: &AsyncConfig,
    queue: &TaskQueue,
    state: &Arc<PumpState>,
) -> Result<Option<Pump>> {
    if queue.dispatch_mode(Port::Work) != DispatchMode::Manual {
        return Ok(None);
    }

    state.reset();

    let notify = Arc::clone(state);
    let token = queue
        .register_monitor(Ports::WORK, move |_| notify.notify_work_ready())
        .context("failed to register work pump monitor")?;

    match Pump::spawn(cfg, queue.duplicate(), token, Arc::clone(state)) {
        Ok(pump) => Ok(Some(pump)),
        Err(e) => {
            queue.unregister_monitor(token);
            Err(e)
        }
    }
}

/// Bridges a task queue onto the application's own thread loop.
///
/// Work items are dispatched in the background (by the pump thread when the
/// Work port is manual). Completions on a manual Completion port run only
/// when, and on the thread where, one of the `drain_*` methods is called;
/// typically once per frame.
///
/// Dropping the `AsyncQueue` behaves like [`AsyncQueue::cleanup`], except
/// that errors are logged.
pub struct AsyncQueue {
    queue: TaskQueue,

    state: Arc<PumpState>,

    pump: Option<Pump>,
}

impl AsyncQueue {
    /// The queue to submit operations to. Duplicate it to hand it out.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn is_pump_running(&self) -> bool {
        self.pump.as_ref().is_some_and(Pump::is_running)
    }

    /// Runs up to `max_items` completions on the calling thread. Returns
    /// whether the last attempt found a completion, i.e. `true` hints that
    /// more may be pending.
    ///
    /// Returns `false` without running anything unless the Completion port
    /// is manual.
    pub fn drain_completion_queue(&self, max_items: u32) -> bool {
        drain::drain_up_to(&self.queue, &self.state, max_items)
    }

    /// Runs completions on the calling thread until none is left or `budget`
    /// is spent. A completion is never interrupted: the budget is checked
    /// between two completions, so a slow one overruns it.
    ///
    /// Returns whether the last attempt found a completion.
    pub fn drain_completion_queue_with_timeout(&self, budget: Duration) -> bool {
        drain::drain_with_timeout(&self.queue, &self.state, budget)
    }

    /// Runs completions on the calling thread until none is left, including
    /// those queued by the completions themselves.
    pub fn drain_completion_queue_until_empty(&self) {
        drain::drain_until_empty(&self.queue, &self.state);
    }

    /// Asks the pump thread to exit and every drain in progress to return
    /// before its next completion. Does not wait for anything.
    ///
    /// Once stopped, work is no longer pumped and drains run nothing. Call
    /// [`AsyncQueue::cleanup`] afterwards to join the pump and release the
    /// queue.
    pub fn request_stop(&self) {
        self.state.request_stop();
        tracing::debug!("async queue stop requested");
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.is_stop_requested()
    }

    /// Stops the pump thread, waits for it to exit, then releases the queue.
    /// Also valid after [`AsyncQueue::request_stop`].
    ///
    /// A work item running on the pump thread is allowed to finish. Work items
    /// and completions still queued once the queue is released are dropped
    /// without running.
    pub fn cleanup(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.state.request_stop();

        let res = match self.pump.take() {
            Some(pump) => pump.join(),
            None => Ok(()),
        };

        tracing::debug!(ok = res.is_ok(), "async queue stopped");
        res
    }
}

impl Drop for AsyncQueue {
    fn drop(&mut self) {
        if self.pump.is_none() {
            return;
        }

        if let Err(e) = self.stop_and_join() {
            tracing::error!(error = %e, "error during async queue cleanup");
        }
    }
}

impl fmt::Debug for AsyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueue")
            .field("queue", &self.queue)
            .field("pump_running", &self.is_pump_running())
            .finish()
    }
}

// Export the builder as an AsyncConfig object consumed by the pump.
#[derive(Debug, Clone)]
pub(crate) struct AsyncConfig {
    pub(crate) work_mode: DispatchMode,
    pub(crate) completion_mode: DispatchMode,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) hooks: ThreadHooks,
    pub(crate) pool_threads: Option<usize>,
}

impl AsyncConfig {
    fn validate(&self) -> Result<()> {
        let has_hooks = self.hooks.on_start.is_some() || self.hooks.on_stop.is_some();

        if has_hooks && self.work_mode != DispatchMode::Manual {
            return Err(anyhow!(
                "thread hooks require a Manual work port, found {:?}",
                self.work_mode
            ));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for AsyncConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = AsyncConfig {
            work_mode: builder.work_mode,
            completion_mode: builder.completion_mode,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            hooks: builder.hooks,
            pool_threads: builder.pool_threads,
        };

        cfg.validate()?;
        Ok(cfg)
    }
}
