//! Process-wide registry of threads started through a [`ThreadFactory`].
//!
//! Entries are keyed by [`ThreadId`]. A thread is registered explicitly when
//! its body starts and removed when it exits, so lookups from any thread see
//! exactly the set of live scheduler-managed threads.
//!
//! [`ThreadFactory`]: crate::rt::ThreadFactory
use crate::rt::{PeriodicParameters, Priority};
use crate::task::TaskId;
use dashmap::DashMap;
use std::sync::LazyLock;
use std::thread::{self, ThreadId};

/// What the registry knows about a live thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub name: String,
    pub priority: Priority,
    pub period: Option<PeriodicParameters>,

    /// Task driven by this thread, once it entered [`TaskHandle::run`].
    ///
    /// [`TaskHandle::run`]: crate::task::TaskHandle::run
    pub task: Option<TaskId>,
}

static THREADS: LazyLock<DashMap<ThreadId, ThreadRecord>> = LazyLock::new(DashMap::new);

/// Registers the calling thread, replacing any previous record.
pub(crate) fn register_current(record: ThreadRecord) -> ThreadId {
    let id = thread::current().id();
    THREADS.insert(id, record);
    id
}

pub(crate) fn unregister(id: ThreadId) {
    THREADS.remove(&id);
}

/// Associates `task` with the calling thread. No-op for unregistered threads.
pub(crate) fn attach_task(task: TaskId) {
    if let Some(mut record) = THREADS.get_mut(&thread::current().id()) {
        record.task = Some(task);
    }
}

/// Record of the calling thread, if it was started by a factory.
pub fn current() -> Option<ThreadRecord> {
    get(thread::current().id())
}

pub fn get(id: ThreadId) -> Option<ThreadRecord> {
    THREADS.get(&id).map(|record| record.value().clone())
}

/// Number of live registered threads.
pub fn len() -> usize {
    THREADS.len()
}

pub fn is_empty() -> bool {
    THREADS.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ThreadRecord {
        ThreadRecord {
            name: name.to_owned(),
            priority: Priority::default(),
            period: None,
            task: None,
        }
    }

    #[test]
    fn test_register_attach_unregister() {
        thread::spawn(|| {
            assert!(current().is_none());

            // Unregistered threads are ignored.
            attach_task(TaskId::next());
            assert!(current().is_none());

            let id = register_current(record("registry-test"));
            assert_eq!(current().map(|r| r.name), Some("registry-test".to_owned()));
            assert!(!is_empty());

            let task = TaskId::next();
            attach_task(task);
            assert_eq!(get(id).and_then(|r| r.task), Some(task));

            unregister(id);
            assert!(current().is_none());
        })
        .join()
        .expect("thread panicked");
    }
}
