use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// Monotonic time source used to pace periodic drivers.
pub trait MonotonicClock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin. Never decreases.
    fn now(&self) -> Duration;
}

/// [`Instant`]-based clock, the origin is the first use in the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdMonotonicClock;

static ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

impl MonotonicClock for StdMonotonicClock {
    fn now(&self) -> Duration {
        ORIGIN.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_clock_is_monotonic() {
        let clock = StdMonotonicClock;
        let mut last = clock.now();
        for _ in 0..1_000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }
}
