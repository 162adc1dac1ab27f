use anyhow::Result;
use std::sync::Arc;

/// Pins threads to processors.
pub trait ProcessorAffinity: Send + Sync {
    /// Restricts the calling thread to `cpus`.
    fn pin_current_thread(&self, cpus: &[usize]) -> Result<()>;

    /// Processors the calling thread may currently run on.
    fn current_processors(&self) -> Result<Vec<usize>>;
}

/// Leaves threads wherever the OS schedules them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAffinity;

impl ProcessorAffinity for NoAffinity {
    fn pin_current_thread(&self, _cpus: &[usize]) -> Result<()> {
        Ok(())
    }

    fn current_processors(&self) -> Result<Vec<usize>> {
        Ok((0..std::thread::available_parallelism()?.get()).collect())
    }
}

/// `sched_setaffinity(2)` on the calling thread.
#[cfg(target_os = "linux")]
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxAffinity;

#[cfg(target_os = "linux")]
impl ProcessorAffinity for LinuxAffinity {
    fn pin_current_thread(&self, cpus: &[usize]) -> Result<()> {
        use nix::sched::{CpuSet, sched_setaffinity};
        use nix::unistd::Pid;

        anyhow::ensure!(!cpus.is_empty(), "cannot pin a thread to an empty cpu set");

        let mut set = CpuSet::new();
        for cpu in cpus {
            set.set(*cpu)?;
        }

        // Pid 0 is the calling thread.
        sched_setaffinity(Pid::from_raw(0), &set)?;
        Ok(())
    }

    fn current_processors(&self) -> Result<Vec<usize>> {
        use nix::sched::{CpuSet, sched_getaffinity};
        use nix::unistd::Pid;

        let set = sched_getaffinity(Pid::from_raw(0))?;
        let mut cpus = Vec::new();
        for cpu in 0..CpuSet::count() {
            if set.is_set(cpu)? {
                cpus.push(cpu);
            }
        }
        Ok(cpus)
    }
}

#[cfg(target_os = "linux")]
pub(crate) fn platform_default() -> Arc<dyn ProcessorAffinity> {
    Arc::new(LinuxAffinity)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn platform_default() -> Arc<dyn ProcessorAffinity> {
    Arc::new(NoAffinity)
}
