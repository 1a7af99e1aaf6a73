//! Multi-tap text entry
//!
//! Phone-pad style: repeated taps of the same digit within the window cycle
//! through its letters, erasing the previous letter each step. The cycle
//! table is explicit state data; the "loop" transition is an index back to
//! position 0.

use std::time::{Duration, Instant};

/// Taps later than this start a new letter instead of cycling.
const TAP_WINDOW: Duration = Duration::from_secs(1);

/// Letter cycles per digit key.
static CYCLES: &[(char, &[&str])] = &[
    ('2', &["a", "b", "c"]),
    ('3', &["d", "e", "f"]),
    ('4', &["g", "h", "i"]),
    ('5', &["j", "k", "l"]),
    ('6', &["m", "n", "o"]),
    ('7', &["p", "q", "r", "s"]),
    ('8', &["t", "u", "v"]),
    ('9', &["w", "x", "y", "z"]),
    ('0', &["space"]),
];

/// Key presses the injector should perform for one tap.
#[derive(Debug, PartialEq, Eq)]
pub struct Tap {
    /// Erase the previous letter (backspace) before typing the new one.
    pub erase: bool,
    pub key: &'static str,
}

#[derive(Debug, Default)]
pub struct MultiTap {
    last_digit: Option<char>,
    last_tap: Option<Instant>,
    /// (cycle table row, position within the cycle) while mid-cycle.
    state: Option<(usize, usize)>,
}

impl MultiTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the engine for one tap of `digit` at time `now`.
    ///
    /// Returns `None` for digits without a letter cycle.
    pub fn tap(&mut self, digit: char, now: Instant) -> Option<Tap> {
        let expired = match self.last_tap {
            Some(last) => now.duration_since(last) >= TAP_WINDOW,
            None => true,
        };
        if expired || self.last_digit != Some(digit) {
            self.state = None;
        }
        self.last_digit = Some(digit);
        self.last_tap = Some(now);

        match self.state {
            Some((row, position)) => {
                // Mid-cycle: replace the previous letter with the next one,
                // wrapping back to the start of the cycle.
                let cycle = CYCLES[row].1;
                let position = (position + 1) % cycle.len();
                self.state = Some((row, position));
                Some(Tap {
                    erase: true,
                    key: cycle[position],
                })
            }
            None => {
                let row = CYCLES.iter().position(|(d, _)| *d == digit)?;
                self.state = Some((row, 0));
                Some(Tap {
                    erase: false,
                    key: CYCLES[row].1[0],
                })
            }
        }
    }
}
