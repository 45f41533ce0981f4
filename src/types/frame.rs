//! Frame and packet types shared by the codec and the stream sources

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::StatusFlags;

/// One decoded wire frame.
///
/// The payload is kept as the raw bytes that were on the wire so that
/// re-encoding a decoded frame reproduces it exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame counter, incremented by the basestation for every frame
    pub sequence: u16,

    /// Timestamp counter, reset to 0 at arm
    pub timestamp: u32,

    /// Status bits
    pub status: StatusFlags,

    /// Recording epoch that produced this frame
    pub session_id: u8,

    /// Probe the samples belong to
    pub probe: u8,

    /// Raw payload, one 16-bit word per channel (zero-copy via Arc)
    pub payload: Arc<[u8]>,
}

impl Frame {
    /// Create a new frame from its header fields and raw payload bytes
    pub fn new(
        sequence: u16,
        timestamp: u32,
        status: StatusFlags,
        session_id: u8,
        probe: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self { sequence, timestamp, status, session_id, probe, payload: payload.into() }
    }

    /// Number of channels carried in the payload.
    pub fn channel_count(&self) -> usize {
        self.payload.len() / 2
    }

    /// Per-packet metadata handed to callers.
    pub fn info(&self) -> PacketInfo {
        PacketInfo {
            timestamp: self.timestamp,
            status: self.status,
            payload_length: self.channel_count() as u16,
            session_id: self.session_id,
        }
    }
}

/// Metadata returned alongside each packet's samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo {
    /// Timestamp reported by the basestation
    pub timestamp: u32,
    /// Status bits
    pub status: StatusFlags,
    /// Number of samples (= channels) in the packet
    pub payload_length: u16,
    /// Session the packet was recorded in; a change marks a session boundary
    pub session_id: u8,
}
