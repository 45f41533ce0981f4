//! Diagnostic counter snapshot

use serde::{Deserialize, Serialize};

/// Cumulative stream statistics for one device handle.
///
/// Counters only grow between resets; the device resets them on every
/// transition into the armed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagStats {
    /// Bytes of accepted frames
    pub total_bytes: u64,
    /// Accepted frames
    pub packet_count: u32,
    /// Accepted frames flagged as trigger events
    pub triggers: u32,
    /// Frames from a session other than the current one (stale FIFO data)
    pub session_mismatch: u32,
    /// Frame starts without the magic marker
    pub err_bad_magic: u32,
    /// Frames whose checksum did not match
    pub err_bad_crc: u32,
    /// Gaps in the frame sequence counter (possible overrun)
    pub err_count: u32,
    /// Frames received during a deserializer bit error
    pub err_serdes: u32,
    /// Frames received during a deserializer loss of lock
    pub err_lock: u32,
    /// Frames received with the block FIFO flagged empty
    pub err_pop: u32,
    /// Frames received while front-end receivers were out of sync
    pub err_sync: u32,
    /// Packets dropped from a full host-side probe queue
    pub host_dropped: u32,
}

impl DiagStats {
    /// Sum of all framing and link error counters.
    pub fn error_total(&self) -> u64 {
        [
            self.err_bad_magic,
            self.err_bad_crc,
            self.err_count,
            self.err_serdes,
            self.err_lock,
            self.err_pop,
            self.err_sync,
        ]
        .iter()
        .map(|&c| c as u64)
        .sum()
    }

    /// True when every counter is zero.
    pub fn is_clear(&self) -> bool {
        *self == DiagStats::default()
    }
}
