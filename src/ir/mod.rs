//! Infrared pulse and packet types
//!
//! A packet is one complete IR transmission: an ordered list of timed
//! high/low pulses as reported by the IR Toy in sampling mode.

pub mod decoder;
pub mod device;
pub mod dict;

use std::fmt;

/// A single timed high or low interval within a packet.
///
/// Widths are in IR Toy sample units (two bytes on the wire, big endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// True while the carrier is detected ("mark"), false for silence ("space").
    pub on: bool,
    pub width: u16,
}

/// One complete IR transmission, bounded by a frame boundary.
///
/// Exclusively owned by the decoder while under construction; ownership
/// moves to the caller once the frame boundary is seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pulses: Vec<Pulse>,
}

impl Packet {
    pub fn new() -> Self {
        Self { pulses: Vec::new() }
    }

    /// Build a packet from raw widths, alternating polarity starting with a mark.
    ///
    /// This is the shape the control-file format stores: widths only, the
    /// mark/space alternation being implicit.
    pub fn from_widths(widths: &[u16]) -> Self {
        let mut on = false;
        let pulses = widths
            .iter()
            .map(|&width| {
                on = !on;
                Pulse { on, width }
            })
            .collect();
        Self { pulses }
    }

    pub fn push(&mut self, pulse: Pulse) {
        self.pulses.push(pulse);
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    pub fn widths(&self) -> impl Iterator<Item = u16> + '_ {
        self.pulses.iter().map(|p| p.width)
    }

    /// Summed duration of every pulse in the packet.
    pub fn total_width(&self) -> u32 {
        self.pulses.iter().map(|p| u32::from(p.width)).sum()
    }

    /// Render the packet as a proportionally scaled high/low glyph waveform.
    ///
    /// Marks print as `|`, spaces as `_`, scaled to fit `columns`. Used for
    /// matching verification in logs, never for decoding.
    pub fn render(&self, columns: usize) -> String {
        let total = self.total_width();
        if total == 0 {
            return String::new();
        }
        let mut out = String::with_capacity(columns);
        let mut elapsed: u64 = 0;
        let mut drawn: u64 = 0;
        for pulse in &self.pulses {
            elapsed += u64::from(pulse.width);
            let glyph = if pulse.on { '|' } else { '_' };
            while drawn < elapsed * columns as u64 / u64::from(total) {
                drawn += 1;
                out.push(glyph);
            }
        }
        out
    }
}

impl fmt::Display for Packet {
    /// The textual form used by the control file and the capture log:
    /// `{ 5 10 20 }`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for pulse in &self.pulses {
            write!(f, "{} ", pulse.width)?;
        }
        write!(f, "}}")
    }
}

/// Do two packets encode the same button press, within `jitter` sample units?
///
/// Requires equal pulse counts, every corresponding width within `jitter`,
/// and the summed packet durations within `jitter` of each other. The total
/// check keeps per-pulse drift from compounding into a different button.
pub fn packets_match(a: &Packet, b: &Packet, jitter: u16) -> bool {
    if a.len() != b.len() {
        return false;
    }
    for (pa, pb) in a.pulses.iter().zip(&b.pulses) {
        if pa.width.abs_diff(pb.width) > jitter {
            return false;
        }
    }
    a.total_width().abs_diff(b.total_width()) <= u32::from(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_widths_alternates_starting_with_mark() {
        let k = Packet::from_widths(&[5, 10, 20]);
        assert_eq!(
            k.pulses(),
            &[
                Pulse { on: true, width: 5 },
                Pulse { on: false, width: 10 },
                Pulse { on: true, width: 20 },
            ]
        );
    }

    #[test]
    fn match_rejects_different_pulse_counts() {
        let a = Packet::from_widths(&[5, 10]);
        let b = Packet::from_widths(&[5, 10, 20]);
        assert!(!packets_match(&a, &b, 100));
    }

    #[test]
    fn match_allows_per_pulse_jitter() {
        let a = Packet::from_widths(&[100, 200, 300]);
        let b = Packet::from_widths(&[102, 198, 301]);
        assert!(packets_match(&a, &b, 3));
        assert!(!packets_match(&a, &b, 1));
    }

    #[test]
    fn match_rejects_compounding_drift() {
        // Every width off by exactly the jitter in the same direction: the
        // per-pulse check passes but the summed totals differ by 2x jitter.
        let a = Packet::from_widths(&[10, 10]);
        let b = Packet::from_widths(&[13, 13]);
        assert!(!packets_match(&a, &b, 3));
    }

    #[test]
    fn display_matches_control_file_form() {
        let k = Packet::from_widths(&[5, 10, 20]);
        assert_eq!(k.to_string(), "{ 5 10 20 }");
        assert_eq!(Packet::new().to_string(), "{ }");
    }

    #[test]
    fn render_is_proportional() {
        let k = Packet::from_widths(&[10, 10]);
        let drawn = k.render(10);
        assert_eq!(drawn, "|||||_____");
    }

    #[test]
    fn render_empty_packet() {
        assert_eq!(Packet::new().render(78), "");
    }

    proptest! {
        #[test]
        fn match_is_reflexive_at_zero_jitter(widths in proptest::collection::vec(1u16..2000, 1..32)) {
            let k = Packet::from_widths(&widths);
            prop_assert!(packets_match(&k, &k, 0));
        }

        #[test]
        fn match_is_symmetric(
            a in proptest::collection::vec(1u16..2000, 1..16),
            b in proptest::collection::vec(1u16..2000, 1..16),
            jitter in 0u16..50,
        ) {
            let ka = Packet::from_widths(&a);
            let kb = Packet::from_widths(&b);
            prop_assert_eq!(packets_match(&ka, &kb, jitter), packets_match(&kb, &ka, jitter));
        }
    }
}
