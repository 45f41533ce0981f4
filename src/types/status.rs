//! Frame status bits reported by the basestation

use serde::{Deserialize, Serialize};

/// Status word carried in every frame header.
///
/// The low byte holds event and physical-layer flags; the high byte mirrors
/// the digital (TTL) input lines sampled with the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusFlags(pub u16);

impl StatusFlags {
    /// Trigger event received with this frame.
    pub const TRIGGER: u16 = 1 << 0;
    /// Deserializer bit error during reception.
    pub const SERDES_ERROR: u16 = 1 << 1;
    /// Deserializer loss of lock during reception.
    pub const LOCK_LOSS: u16 = 1 << 2;
    /// Block number FIFO flagged empty on pop.
    pub const POP_UNDERFLOW: u16 = 1 << 3;
    /// Front-end receivers out of sync.
    pub const SYNC_ERROR: u16 = 1 << 4;
    /// Digital input lines.
    pub const TTL_MASK: u16 = 0xFF00;

    /// Create status flags from the raw header value.
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Check if a specific flag is set using a bitmask.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    pub fn is_trigger(&self) -> bool {
        self.has_flag(Self::TRIGGER)
    }

    /// Any of the physical-layer error flags.
    pub fn has_link_error(&self) -> bool {
        self.has_flag(
            Self::SERDES_ERROR | Self::LOCK_LOSS | Self::POP_UNDERFLOW | Self::SYNC_ERROR,
        )
    }

    /// State of the digital input lines, bit N = line N.
    pub fn ttl_inputs(&self) -> u8 {
        ((self.0 & Self::TTL_MASK) >> 8) as u8
    }

    /// Get the raw u16 value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Compare 16-bit sequence counters with wraparound using the half-range rule.
/// Returns true if `a` is considered newer than `b`.
pub fn sequence_after(a: u16, b: u16) -> bool {
    if a == b {
        return false;
    }
    a.wrapping_sub(b) < 0x8000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_decode_independently() {
        let status = StatusFlags::new(StatusFlags::TRIGGER | StatusFlags::LOCK_LOSS | 0xA500);

        assert!(status.is_trigger());
        assert!(status.has_flag(StatusFlags::LOCK_LOSS));
        assert!(!status.has_flag(StatusFlags::SERDES_ERROR));
        assert!(status.has_link_error());
        assert_eq!(status.ttl_inputs(), 0xA5);
    }

    #[test]
    fn ttl_lines_are_not_link_errors() {
        let status = StatusFlags::new(0xFF00);
        assert!(!status.has_link_error());
        assert!(!status.is_trigger());
    }

    #[test]
    fn sequence_comparison_wraps() {
        assert!(sequence_after(1, 0));
        assert!(sequence_after(0, u16::MAX));
        assert!(!sequence_after(u16::MAX, 0));
        assert!(!sequence_after(7, 7));
    }
}
