//! Wall-clock source for measurement timestamps and the default query window.

/// Seconds since the Unix epoch, with sub-second precision.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Always returns the same instant. Used by tests that pin the query window.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f64);

impl Clock for FixedClock {
    fn now(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800.0);
    }
}
