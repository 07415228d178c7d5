use std::marker::PhantomData;

/// Runs a closure when it goes out of scope, whether the scope is left by a
/// normal return, an early return or a panic.
///
/// Long-lived threads use it to release what they registered on startup even
/// if a user callback unwinds through them.
pub(crate) struct ScopeGuard<'a, F: FnOnce()> {
    // `Option` so the closure can be taken exactly once.
    on_exit: Option<F>,

    _p: PhantomData<&'a ()>,
}

impl<'a, F: FnOnce()> ScopeGuard<'a, F> {
    pub(crate) fn new(on_exit: F) -> Self {
        ScopeGuard {
            on_exit: Some(on_exit),
            _p: PhantomData,
        }
    }

    /// The closure will not run on drop.
    #[cfg(test)]
    pub(crate) fn disarm(&mut self) {
        self.on_exit.take();
    }
}

impl<'a, F: FnOnce()> Drop for ScopeGuard<'a, F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
    }
}
