//! Keypress debounce and auto-repeat
//!
//! Remotes fire the same packet many times per second while a button is
//! held. This engine drops duplicates inside the current repeat interval
//! and shortens the interval a step on every accepted repeat, so holding a
//! button accelerates.

use std::time::{Duration, Instant};

use tracing::debug;

/// Symbol some remotes send instead of re-sending the held button.
pub const REPEAT_SYMBOL: &str = "REPEAT";

#[derive(Debug)]
pub struct DebounceRepeat {
    /// Base debounce interval; the first repeat waits this long.
    base: Duration,
    /// Current repeat interval, shrinking while a button is held.
    interval: Duration,
    last: Option<String>,
    next_allowed: Option<Instant>,
}

impl DebounceRepeat {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            interval: Duration::ZERO,
            last: None,
            next_allowed: None,
        }
    }

    /// Decide whether `symbol` should be dispatched at time `now`.
    ///
    /// Returns the symbol to dispatch (with `REPEAT` rewritten to the
    /// previously dispatched symbol) or `None` to drop it. Timers are only
    /// updated on dispatch.
    pub fn filter(&mut self, symbol: &str, now: Instant) -> Option<String> {
        let symbol = if symbol == REPEAT_SYMBOL {
            match &self.last {
                Some(previous) => {
                    debug!("REPEAT symbol from remote -> '{}'", previous);
                    previous.clone()
                }
                // No previous keypress. Weird, but possible if a packet was
                // lost. Ignore.
                None => return None,
            }
        } else {
            symbol.to_string()
        };

        let repeated = match (&self.last, self.next_allowed) {
            (Some(last), Some(next_allowed)) if *last == symbol => {
                if now < next_allowed {
                    debug!("Dropping too-soon keypress '{}'", symbol);
                    return None;
                }
                true
            }
            _ => false,
        };

        if repeated {
            // Accelerate: each accepted repeat shaves 1/16 of the base off
            // the interval, floored at zero.
            self.interval = self.interval.saturating_sub(self.base / 16);
        } else {
            self.interval = self.base;
        }
        self.next_allowed = Some(now + self.interval);
        self.last = Some(symbol.clone());
        Some(symbol)
    }

    /// Receiver timeout: forget the held button and zero the interval.
    pub fn reset(&mut self) {
        self.last = None;
        self.interval = Duration::ZERO;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(160);

    fn engine() -> (DebounceRepeat, Instant) {
        (DebounceRepeat::new(BASE), Instant::now())
    }

    #[test]
    fn fresh_symbol_dispatches_and_arms_base_interval() {
        let (mut eng, t0) = engine();
        assert_eq!(eng.filter("play", t0), Some("play".into()));
        assert_eq!(eng.interval(), BASE);
    }

    #[test]
    fn duplicate_inside_interval_is_dropped() {
        let (mut eng, t0) = engine();
        eng.filter("play", t0);
        assert_eq!(eng.filter("play", t0 + Duration::from_millis(50)), None);
        // Timers unchanged: still allowed at the originally armed time.
        assert_eq!(
            eng.filter("play", t0 + BASE),
            Some("play".into())
        );
    }

    #[test]
    fn repeat_after_interval_dispatches_and_shortens() {
        let (mut eng, t0) = engine();
        eng.filter("play", t0);
        let t1 = t0 + BASE;
        assert_eq!(eng.filter("play", t1), Some("play".into()));
        assert_eq!(eng.interval(), BASE - BASE / 16);
    }

    #[test]
    fn different_symbol_dispatches_immediately() {
        let (mut eng, t0) = engine();
        eng.filter("play", t0);
        // Within the play interval, but a different button.
        assert_eq!(
            eng.filter("stop", t0 + Duration::from_millis(10)),
            Some("stop".into())
        );
        // And the interval is back at base, not accelerated.
        assert_eq!(eng.interval(), BASE);
    }

    #[test]
    fn repeat_symbol_is_rewritten() {
        let (mut eng, t0) = engine();
        eng.filter("play", t0);
        assert_eq!(eng.filter(REPEAT_SYMBOL, t0 + BASE), Some("play".into()));
    }

    #[test]
    fn repeat_symbol_respects_debounce_window() {
        let (mut eng, t0) = engine();
        eng.filter("play", t0);
        assert_eq!(eng.filter(REPEAT_SYMBOL, t0 + Duration::from_millis(5)), None);
    }

    #[test]
    fn repeat_symbol_without_history_is_dropped() {
        let (mut eng, t0) = engine();
        assert_eq!(eng.filter(REPEAT_SYMBOL, t0), None);
    }

    #[test]
    fn interval_floors_at_zero() {
        let mut eng = DebounceRepeat::new(Duration::from_millis(16));
        let mut now = Instant::now();
        eng.filter("play", now);
        for _ in 0..20 {
            now += eng.interval().max(Duration::from_nanos(1));
            eng.filter("play", now);
        }
        assert_eq!(eng.interval(), Duration::ZERO);
        // At zero interval every press dispatches.
        assert_eq!(eng.filter("play", now), Some("play".into()));
    }

    #[test]
    fn timeout_reset_forgets_held_button() {
        let (mut eng, t0) = engine();
        eng.filter("play", t0);
        eng.reset();
        assert_eq!(eng.interval(), Duration::ZERO);
        // Same button right away is fresh again, not a dropped repeat.
        assert_eq!(
            eng.filter("play", t0 + Duration::from_millis(1)),
            Some("play".into())
        );
        // And REPEAT has nothing to repeat.
        eng.reset();
        assert_eq!(eng.filter(REPEAT_SYMBOL, t0 + Duration::from_millis(2)), None);
    }
}
