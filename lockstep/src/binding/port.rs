use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// A field shared between the task that owns it and the bindings reading or
/// writing it.
///
/// Tasks should hold the lock only long enough to read or write the value.
/// Bindings never wait for it: a port that is locked when the scheduler
/// copies is skipped for that phase.
pub struct Port<T>(Arc<Mutex<T>>);

impl<T> Port<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.0.try_lock()
    }

    /// Whether both ports refer to the same field.
    pub fn same_as(&self, other: &Port<T>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Default> Default for Port<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for Port<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(value) => f.debug_tuple("Port").field(&*value).finish(),
            None => f.debug_tuple("Port").field(&"<locked>").finish(),
        }
    }
}
