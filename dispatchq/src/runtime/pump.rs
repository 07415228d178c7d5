use crate::queue::{MonitorToken, Port, TaskQueue};
use crate::runtime::AsyncConfig;
use crate::utils::thread::{ThreadHooks, thread_builder};
use crate::utils::{ScopeGuard, panic_message};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Flags {
    work_ready: bool,
    stop_requested: bool,
}

/// Signals exchanged between the work monitor, the pump thread and whoever
/// shuts the adapter down.
#[derive(Debug, Default)]
pub(crate) struct PumpState {
    flags: Mutex<Flags>,
    cond: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpSignal {
    Work,
    Stop,
}

impl PumpState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&self) {
        *self.flags.lock() = Flags::default();
    }

    /// Called by the Work port monitor each time an item is queued.
    pub(crate) fn notify_work_ready(&self) {
        let mut flags = self.flags.lock();
        flags.work_ready = true;
        self.cond.notify_one();
    }

    pub(crate) fn request_stop(&self) {
        let mut flags = self.flags.lock();
        flags.stop_requested = true;
        self.cond.notify_all();
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.flags.lock().stop_requested
    }

    /// Blocks until work is ready or a stop is requested. Stop wins over
    /// pending work. Consumes the work-ready flag.
    pub(crate) fn wait(&self) -> PumpSignal {
        let mut flags = self.flags.lock();
        self.cond
            .wait_while(&mut flags, |f| !f.work_ready && !f.stop_requested);

        if flags.stop_requested {
            PumpSignal::Stop
        } else {
            flags.work_ready = false;
            PumpSignal::Work
        }
    }
}

/// Background thread dispatching the Work port of a queue whose work mode is
/// [`DispatchMode::Manual`](crate::queue::DispatchMode::Manual).
#[derive(Debug)]
pub(crate) struct Pump {
    handle: thread::JoinHandle<()>,
}

impl Pump {
    /// `queue` is the pump's own handle, released when the thread exits.
    /// `token` is unregistered from it at the same time.
    ///
    /// Returns once the start hook has run on the new thread. A panicking
    /// start hook is reported here rather than left for `join`.
    pub(crate) fn spawn(
        cfg: &AsyncConfig,
        queue: TaskQueue,
        token: MonitorToken,
        state: Arc<PumpState>,
    ) -> Result<Pump> {
        let hooks = cfg.hooks.clone();
        let (started_tx, started_rx) = bounded(1);

        let handle = thread_builder(&cfg.thread_name, cfg.thread_stack_size)
            .spawn(move || run(queue, token, state, hooks, started_tx))
            .context("failed to spawn work pump thread")?;

        // The sender is dropped without sending only if the start hook unwound.
        if started_rx.recv().is_err() {
            let reason = match handle.join() {
                Err(payload) => panic_message(payload.as_ref()),
                Ok(()) => "thread exited before starting".to_string(),
            };
            return Err(anyhow!("work pump thread failed to start: {}", reason));
        }

        Ok(Pump { handle })
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub(crate) fn join(self) -> Result<()> {
        self.handle.join().map_err(|payload| {
            anyhow!("work pump thread panicked: {}", panic_message(payload.as_ref()))
        })
    }
}

fn run(
    queue: TaskQueue,
    token: MonitorToken,
    state: Arc<PumpState>,
    hooks: ThreadHooks,
    started: Sender<()>,
) {
    // If this unwinds, the spawner unregisters `token` and the stop hook is
    // skipped.
    hooks.start();

    let _guard = ScopeGuard::new(|| {
        if !queue.unregister_monitor(token) {
            tracing::warn!(?token, "work pump monitor was already unregistered");
        }
        hooks.stop();
    });

    // Capacity 1, never blocks.
    let _ = started.send(());

    tracing::debug!("work pump started");

    while state.wait() == PumpSignal::Work {
        let dispatched = drain_work(&queue, &state);
        tracing::trace!(dispatched, "work pump drained work port");
    }

    tracing::debug!("work pump stopping");
}

/// Dispatches work items one at a time until the port is empty or a stop is
/// requested. Returns how many items were dispatched.
fn drain_work(queue: &TaskQueue, state: &PumpState) -> usize {
    let mut dispatched = 0;

    while !state.is_stop_requested() {
        match panic::catch_unwind(AssertUnwindSafe(|| {
            queue.dispatch(Port::Work, Duration::ZERO)
        })) {
            Ok(true) => dispatched += 1,
            Ok(false) => break,
            Err(payload) => {
                dispatched += 1;
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "work item panicked on the work pump"
                );
            }
        }
    }

    dispatched
}
