//! Trailing-edge debouncer for the compile preview.
//!
//! Each trigger restarts the single pending deadline and replaces the held
//! state, so a burst of edits produces exactly one firing with the latest
//! text. Polled from the UI tick loop rather than timer-driven.

use std::time::{Duration, Instant};

pub(crate) struct Debouncer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Arm (or re-arm) the deadline at `now + delay` holding `state`.
    pub(crate) fn trigger(&mut self, state: T, now: Instant) {
        self.pending = Some((now + self.delay, state));
    }

    /// Clear any pending deadline without firing.
    pub(crate) fn cancel(&mut self) {
        self.pending = None;
    }

    /// Yield the held state once the deadline has passed.
    pub(crate) fn fire(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.pending.take().map(|(_, s)| s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(500);

    #[test]
    fn burst_of_triggers_fires_once_with_the_last_state() {
        let start = Instant::now();
        let mut d = Debouncer::new(DELAY);
        for i in 0..10 {
            d.trigger(i, start + Duration::from_millis(i * 50));
        }
        // 450 ms in: the ninth trigger re-armed the deadline to 950 ms.
        assert_eq!(d.fire(start + Duration::from_millis(900)), None);
        assert_eq!(d.fire(start + Duration::from_millis(950)), Some(9));
        // Nothing left pending afterwards.
        assert_eq!(d.fire(start + Duration::from_millis(2_000)), None);
    }

    #[test]
    fn fires_exactly_at_the_deadline() {
        let start = Instant::now();
        let mut d = Debouncer::new(DELAY);
        d.trigger("state", start);
        assert_eq!(d.fire(start + Duration::from_millis(499)), None);
        assert_eq!(d.fire(start + DELAY), Some("state"));
    }

    #[test]
    fn cancel_clears_the_pending_deadline() {
        let start = Instant::now();
        let mut d = Debouncer::new(DELAY);
        d.trigger("state", start);
        d.cancel();
        assert_eq!(d.fire(start + Duration::from_secs(10)), None);
    }
}
