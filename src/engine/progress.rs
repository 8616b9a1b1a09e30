//! Adaptive cadence for the operation-count heartbeat.
//!
//! The progress hook fires on every engine operation; emitting each count
//! would swamp the channel. The interval self-tunes: grow it ×10 when the
//! hook fires again within 50 ms, emit when at least 100 ms have passed, and
//! shrink it ÷10 once emissions are more than 500 ms apart.

use std::time::Instant;

pub(crate) struct OpsThrottle {
    interval: u64,
    last: Instant,
}

impl OpsThrottle {
    pub(crate) fn new() -> Self {
        Self {
            interval: 1_000,
            last: Instant::now(),
        }
    }

    /// Returns the count to emit when a heartbeat is due.
    pub(crate) fn observe(&mut self, ops: u64, now: Instant) -> Option<u64> {
        if ops % self.interval != 0 {
            return None;
        }
        let elapsed_ms = now.duration_since(self.last).as_millis();
        if elapsed_ms < 50 {
            self.interval = self.interval.saturating_mul(10);
            None
        } else if elapsed_ms >= 100 {
            self.last = now;
            if elapsed_ms >= 500 && self.interval > 1 {
                self.interval /= 10;
            }
            Some(ops)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn grows_interval_under_fast_callbacks() {
        let start = Instant::now();
        let mut throttle = OpsThrottle {
            interval: 1_000,
            last: start,
        };
        assert_eq!(throttle.observe(1_000, start + Duration::from_millis(10)), None);
        // Interval grew to 10_000, so 2_000 is no longer on the boundary.
        assert_eq!(throttle.observe(2_000, start + Duration::from_millis(200)), None);
        assert_eq!(
            throttle.observe(10_000, start + Duration::from_millis(200)),
            Some(10_000)
        );
    }

    #[test]
    fn emits_after_hundred_millis() {
        let start = Instant::now();
        let mut throttle = OpsThrottle {
            interval: 1_000,
            last: start,
        };
        assert_eq!(
            throttle.observe(1_000, start + Duration::from_millis(150)),
            Some(1_000)
        );
        // Emission resets the reference instant.
        assert_eq!(throttle.observe(2_000, start + Duration::from_millis(200)), None);
    }

    #[test]
    fn shrinks_interval_when_emissions_are_sparse() {
        let start = Instant::now();
        let mut throttle = OpsThrottle {
            interval: 1_000,
            last: start,
        };
        assert_eq!(
            throttle.observe(1_000, start + Duration::from_millis(600)),
            Some(1_000)
        );
        assert_eq!(throttle.interval, 100);
    }

    #[test]
    fn skips_counts_off_the_interval_boundary() {
        let start = Instant::now();
        let mut throttle = OpsThrottle {
            interval: 1_000,
            last: start,
        };
        assert_eq!(throttle.observe(1_234, start + Duration::from_millis(600)), None);
    }
}
