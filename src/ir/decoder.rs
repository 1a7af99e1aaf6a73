//! Pulse-to-packet decoding state machine
//!
//! Reassembles the IR Toy's byte stream into 16-bit pulse widths, collects
//! pulses into packets, and detects frame boundaries: the explicit `0xFFFF`
//! end-of-transmission marker, inter-packet gaps, and receiver silence
//! timeouts driven by the reactor.

use thiserror::Error;

use crate::config::Tuning;
use crate::ir::{Packet, Pulse};

/// Reserved width value marking an explicit end of transmission.
pub const END_OF_TRANSMISSION: u16 = 0xFFFF;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// An inter-packet gap arrived with no packet under construction.
    /// The receiver stream is desynchronized beyond recovery.
    #[error("inter-packet gap with no packet in progress")]
    GapWithoutPacket,
}

/// Decoder state for one physical receiver.
///
/// Mutated on every received byte; returns to idle after emitting a packet.
#[derive(Debug)]
pub struct PulseDecoder {
    /// Current carrier state. Flips on every real pulse.
    on: bool,
    /// Packet under construction, if any.
    packet: Option<Packet>,
    /// Width of the last pulse appended to the current packet.
    last_width: Option<u16>,
    /// High byte awaiting its pair, buffered across `feed` calls.
    pending: Option<u8>,
    /// Set when the previous frame was terminated by a silence timeout. The
    /// next gap is then an artifact of the same silence, not a boundary.
    timed_out: bool,
    gap_multiplier: u32,
    min_gap_width: u16,
}

impl PulseDecoder {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            on: false,
            packet: None,
            last_width: None,
            pending: None,
            timed_out: false,
            gap_multiplier: tuning.gap_multiplier,
            min_gap_width: tuning.min_gap_width,
        }
    }

    /// Feed raw bytes from the receiver, returning every packet completed by
    /// this chunk. Widths arrive as big-endian byte pairs; an odd trailing
    /// byte stays buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Packet>, DecodeError> {
        let mut out = Vec::new();
        for &byte in bytes {
            match self.pending.take() {
                Some(high) => {
                    let width = u16::from_be_bytes([high, byte]);
                    if let Some(packet) = self.pulse(width)? {
                        out.push(packet);
                    }
                }
                None => self.pending = Some(byte),
            }
        }
        Ok(out)
    }

    /// Process one reassembled pulse width.
    pub fn pulse(&mut self, width: u16) -> Result<Option<Packet>, DecodeError> {
        // Timeout debt only survives until the next pulse.
        let timed_out = std::mem::take(&mut self.timed_out);

        if width == END_OF_TRANSMISSION {
            self.on = false;
            return Ok(self.packet.take());
        }

        self.on = !self.on;
        if !self.on && self.is_gap(width) {
            if timed_out {
                // Gap trailing a timeout-terminated frame: same silence,
                // already accounted for. Drop it.
                return Ok(None);
            }
            let packet = self.packet.take().ok_or(DecodeError::GapWithoutPacket)?;
            return Ok(Some(packet));
        }

        self.packet
            .get_or_insert_with(Packet::new)
            .push(Pulse { on: self.on, width });
        self.last_width = Some(width);
        Ok(None)
    }

    /// Receiver has gone quiet: finalize any packet under construction.
    ///
    /// Invoked by the reactor after the configured quiet interval. Sets the
    /// timeout debt so the gap that reported this silence is not taken as a
    /// second boundary. A lone buffered `0xFF` high byte is dropped here: it
    /// is almost certainly the second half of a split end marker that we
    /// misread as the start of a new width.
    pub fn timeout(&mut self) -> Option<Packet> {
        self.timed_out = true;
        if self.pending == Some(0xFF) {
            self.pending = None;
        }
        self.packet.take()
    }

    fn is_gap(&self, width: u16) -> bool {
        let Some(last) = self.last_width else {
            return false;
        };
        u32::from(width) > self.gap_multiplier * u32::from(last) && width >= self.min_gap_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> PulseDecoder {
        PulseDecoder::new(&Tuning::default())
    }

    fn widths(packet: &Packet) -> Vec<u16> {
        packet.widths().collect()
    }

    #[test]
    fn sentinel_emits_packet_verbatim_and_returns_to_idle() {
        let mut dec = decoder();
        let packets = dec
            .feed(&[0, 5, 0, 10, 0, 20, 0xFF, 0xFF])
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(widths(&packets[0]), vec![5, 10, 20]);
        // Back to idle: the same sequence decodes identically again.
        let again = dec
            .feed(&[0, 5, 0, 10, 0, 20, 0xFF, 0xFF])
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0], packets[0]);
    }

    #[test]
    fn sentinel_with_no_packet_is_a_no_op() {
        let mut dec = decoder();
        assert!(dec.feed(&[0xFF, 0xFF]).unwrap().is_empty());
    }

    #[test]
    fn golden_fixture_splits_at_gap_and_end_marker() {
        // Regression contract: the boundary falls after the gap pulse of
        // width 100 and immediately after the 0xFFFF pair; the trailing
        // group stays in progress.
        let mut dec = decoder();
        let bytes = [
            0, 5, 0, 5, 0, 10, 0, 100, //
            0, 1, 0, 2, 0, 3, 0, 40, //
            255, 255, //
            0, 1, 0, 2, 0, 3, 0, 40,
        ];
        let packets = dec.feed(&bytes).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(widths(&packets[0]), vec![5, 5, 10]);
        assert_eq!(widths(&packets[1]), vec![1, 2, 3, 40]);
    }

    #[test]
    fn high_byte_buffers_across_feed_calls() {
        let mut dec = decoder();
        assert!(dec.feed(&[0, 5, 0]).unwrap().is_empty());
        let packets = dec.feed(&[10, 0xFF, 0xFF]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(widths(&packets[0]), vec![5, 10]);
    }

    #[test]
    fn gap_pulse_ends_packet_and_is_discarded() {
        let mut dec = decoder();
        // 200 is both >8x the previous width and above the gap floor.
        let packets = dec.feed(&[0, 10, 0, 10, 0, 12, 0, 200]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(widths(&packets[0]), vec![10, 10, 12]);
    }

    #[test]
    fn short_trailer_below_gap_floor_stays_in_packet() {
        let mut dec = decoder();
        // 40 exceeds 8x the previous width of 3 but sits below the floor,
        // so it is packet content, not a boundary.
        let packets = dec.feed(&[0, 1, 0, 2, 0, 3, 0, 40, 0xFF, 0xFF]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(widths(&packets[0]), vec![1, 2, 3, 40]);
    }

    #[test]
    fn timeout_flushes_partial_packet() {
        let mut dec = decoder();
        assert!(dec.feed(&[0, 10, 0, 12]).unwrap().is_empty());
        let flushed = dec.timeout().expect("partial packet");
        assert_eq!(widths(&flushed), vec![10, 12]);
        assert!(dec.timeout().is_none());
    }

    #[test]
    fn gap_after_timeout_is_dropped() {
        let mut dec = decoder();
        dec.feed(&[0, 10]).unwrap();
        dec.timeout().expect("partial packet");
        // The silence that caused the timeout now shows up as a gap pulse;
        // it must not be treated as another boundary (and there is no packet
        // for it to close, which would otherwise be fatal).
        let packets = dec.feed(&[0, 200, 0, 3, 0, 4]).unwrap();
        assert!(packets.is_empty());
        let flushed = dec.timeout().expect("next packet in progress");
        assert_eq!(widths(&flushed), vec![3, 4]);
    }

    #[test]
    fn lone_ff_high_byte_is_dropped_on_timeout() {
        let mut dec = decoder();
        // 0xFF pending: probably the tail of a split 0xFF 0xFF end marker.
        dec.feed(&[0xFF]).unwrap();
        dec.timeout();
        // The next byte must start a fresh width, not pair with the 0xFF.
        let packets = dec.feed(&[0, 9, 0xFF, 0xFF]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(widths(&packets[0]), vec![9]);
    }

    #[test]
    fn non_ff_pending_byte_survives_timeout() {
        let mut dec = decoder();
        dec.feed(&[0]).unwrap();
        dec.timeout();
        let packets = dec.feed(&[7, 0xFF, 0xFF]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(widths(&packets[0]), vec![7]);
    }
}
