use crate::queue::errors::QueueError;
use crate::queue::port::Ports;
use crate::queue::shared::Shared;
use crate::utils::panic_message;
use crate::utils::thread::{ThreadNameFn, thread_builder};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    pub(crate) threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
}

/// Worker threads executing the items of every port configured with
/// [`DispatchMode::ThreadPool`](crate::queue::DispatchMode::ThreadPool).
///
/// Workers only hold the queue's storage, never a handle, so they do not keep
/// the queue alive. They exit once the last handle terminates the queue.
#[derive(Debug)]
pub(crate) struct ThreadPool {
    ports: Ports,
    handles: Mutex<HashMap<ThreadId, thread::JoinHandle<()>>>,
}

impl ThreadPool {
    pub(crate) fn spawn(
        shared: &Arc<Shared>,
        ports: Ports,
        cfg: &PoolConfig,
    ) -> Result<Self, QueueError> {
        let pool = Self {
            ports,
            handles: Mutex::new(HashMap::with_capacity(cfg.threads)),
        };

        for _ in 0..cfg.threads {
            let shared = Arc::clone(shared);

            let handle = thread_builder(&cfg.thread_name, cfg.thread_stack_size)
                .spawn(move || worker_loop(shared, ports))
                // Workers spawned so far are detached, they exit once the
                // caller terminates the queue.
                .map_err(QueueError::ThreadSpawn)?;

            pool.handles.lock().insert(handle.thread().id(), handle);
        }

        tracing::debug!(threads = cfg.threads, ?ports, "spawned task queue thread pool");

        Ok(pool)
    }

    pub(crate) fn ports(&self) -> Ports {
        self.ports
    }

    /// Joins every worker. The queue must be terminated first, otherwise this
    /// blocks forever.
    ///
    /// The last handle may be released by a pool callback, in which case we
    /// are running on one of the workers: that thread is detached instead.
    pub(crate) fn join_all(&self) -> Result<()> {
        let current = thread::current().id();
        let mut handles = self.handles.lock();

        let errors = handles
            .drain()
            .filter(|(thread_id, _)| *thread_id != current)
            .filter_map(|(thread_id, handle)| handle.join().err().map(|_| thread_id))
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} thread pool worker(s) panicked", errors.len()))
        }
    }
}

fn worker_loop(shared: Arc<Shared>, ports: Ports) {
    while let Some(callback) = shared.wait_pop(ports, None) {
        // A panicking callback must not take a pool worker down with it.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "task queue callback panicked on thread pool worker"
            );
        }
    }
}
