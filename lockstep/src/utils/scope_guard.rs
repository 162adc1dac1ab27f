/// Runs a closure when dropped, unless disarmed first.
///
/// Used to undo process-wide side effects (registry entries) on every exit
/// path of a thread body, including unwinding.
///
/// ```ignore
/// let _guard = ScopeGuard::new(|| registry::unregister(id));
/// run_thread_body();
/// // entry removed here, even if `run_thread_body` panicked
/// ```
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // `Option` so the closure can be moved out exactly once.
    on_drop: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(on_drop: F) -> Self {
        Self {
            on_drop: Some(on_drop),
        }
    }

    /// Drops the closure without running it.
    #[allow(unused)]
    pub(crate) fn disarm(&mut self) {
        self.on_drop.take();
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_runs_on_drop() {
        let fired = Cell::new(0);
        {
            let _guard = ScopeGuard::new(|| fired.set(fired.get() + 1));
            assert_eq!(fired.get(), 0);
        }
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let fired = Cell::new(false);
        {
            let mut guard = ScopeGuard::new(|| fired.set(true));
            guard.disarm();
        }
        assert!(!fired.get());
    }

    #[test]
    fn test_runs_while_unwinding() {
        let fired = AtomicBool::new(false);
        let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _guard = ScopeGuard::new(|| fired.store(true, Ordering::SeqCst));
            panic!("boom");
        }));
        assert!(res.is_err());
        assert!(fired.load(Ordering::SeqCst));
    }
}
