use anyhow::{Result, bail};
use std::sync::OnceLock;

/// Processors configured in the system, online or not.
///
/// Unlike `std::thread::available_parallelism`, this is not reduced by the
/// affinity mask (`isolcpus`) or by a cgroup cpu quota, so any valid cpu
/// index is below it.
#[cfg(unix)]
pub(crate) fn configured_processors() -> Result<usize> {
    static CONFIGURED: OnceLock<usize> = OnceLock::new();
    if let Some(n) = CONFIGURED.get() {
        return Ok(*n);
    }

    // SAFETY: plain query, no pointers involved.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if n < 1 {
        bail!(
            "sysconf(_SC_NPROCESSORS_CONF) failed: {}",
            std::io::Error::last_os_error()
        );
    }

    Ok(*CONFIGURED.get_or_init(|| n as usize))
}

#[cfg(not(unix))]
pub(crate) fn configured_processors() -> Result<usize> {
    static CONFIGURED: OnceLock<usize> = OnceLock::new();
    if let Some(n) = CONFIGURED.get() {
        return Ok(*n);
    }
    let n = std::thread::available_parallelism()?.get();
    Ok(*CONFIGURED.get_or_init(|| n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_covers_available() -> Result<()> {
        let configured = configured_processors()?;
        assert!(configured >= std::thread::available_parallelism()?.get());
        assert_eq!(configured_processors()?, configured);
        Ok(())
    }
}
