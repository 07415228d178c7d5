use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

impl ThreadNameFn {
    /// Yields `{prefix}-{N}` with N increasing from 0.
    pub(crate) fn counting(prefix: &'static str) -> Self {
        let count = Arc::new(AtomicUsize::new(0));

        ThreadNameFn(Arc::new(move || {
            let id = count.fetch_add(1, Ordering::Relaxed);
            format!("{}-{}", prefix, id)
        }))
    }

    pub(crate) fn fixed(name: String) -> Self {
        ThreadNameFn(Arc::new(move || name.clone()))
    }

    pub(crate) fn next_name(&self) -> String {
        (self.0)()
    }
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

pub(crate) type ThreadHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Callbacks run on a spawned thread right after it starts and right before
/// it exits. Use them to attach the thread to a foreign runtime (a JVM, a COM
/// apartment, ...) and to detach it again.
#[derive(Clone, Default)]
pub(crate) struct ThreadHooks {
    pub(crate) on_start: Option<ThreadHook>,
    pub(crate) on_stop: Option<ThreadHook>,
}

impl ThreadHooks {
    pub(crate) fn start(&self) {
        if let Some(f) = &self.on_start {
            f();
        }
    }

    pub(crate) fn stop(&self) {
        if let Some(f) = &self.on_stop {
            f();
        }
    }
}

impl fmt::Debug for ThreadHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

pub(crate) fn thread_builder(name: &ThreadNameFn, stack_size: Option<usize>) -> thread::Builder {
    let builder = thread::Builder::new().name(name.next_name());

    match stack_size {
        Some(size) => builder.stack_size(size),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_counting_names() {
        let names = ThreadNameFn::counting("dispatchq-test");
        assert_eq!(names.next_name(), "dispatchq-test-0");
        assert_eq!(names.next_name(), "dispatchq-test-1");

        // Clones share the counter.
        let clone = names.clone();
        assert_eq!(clone.next_name(), "dispatchq-test-2");
    }

    #[test]
    fn test_hooks_run_on_spawned_thread() -> anyhow::Result<()> {
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));

        let hooks = ThreadHooks {
            on_start: Some({
                let started = Arc::clone(&started);
                Arc::new(move || started.store(true, Ordering::SeqCst))
            }),
            on_stop: Some({
                let stopped = Arc::clone(&stopped);
                Arc::new(move || stopped.store(true, Ordering::SeqCst))
            }),
        };

        let name = ThreadNameFn::fixed("hooked".to_string());
        let handle = thread_builder(&name, None).spawn(move || {
            hooks.start();
            let name = thread::current().name().map(str::to_string);
            hooks.stop();
            name
        })?;

        let name = handle.join().expect("thread panicked");
        assert_eq!(name.as_deref(), Some("hooked"));
        assert!(started.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
        Ok(())
    }
}
