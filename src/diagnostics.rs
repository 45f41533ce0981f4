//! Diagnostics aggregator
//!
//! Classifies every decoded frame and framing fault into the counters of a
//! [`DiagStats`] snapshot and decides whether a frame belongs to the current
//! session.

use tracing::{debug, trace};

use crate::codec::FaultKind;
use crate::types::{DiagStats, Frame, StatusFlags};

/// How frames from an unexpected session are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Frames must carry the expected session; others are stale and dropped.
    #[default]
    Strict,
    /// A new session id starts a new recording segment.
    Follow,
}

/// Classification of one decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Frame counted and deliverable. `boundary` marks the first frame of a
    /// new session under [`SessionPolicy::Follow`].
    Accepted { boundary: bool },
    /// Frame from another session, counted as a mismatch and dropped.
    Stale,
}

impl Observation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Observation::Accepted { .. })
    }
}

/// Running counters plus the session and sequence continuity tracker.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    stats: DiagStats,
    policy: SessionPolicy,
    expected_session: Option<u8>,
    last_sequence: Option<u16>,
    last_timestamp: Option<u32>,
    session_boundaries: u32,
}

impl Diagnostics {
    pub fn new(policy: SessionPolicy) -> Self {
        Self { policy, ..Default::default() }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Set the session frames are expected to carry. Sequence tracking restarts.
    pub fn expect_session(&mut self, session_id: u8) {
        self.expected_session = Some(session_id);
        self.last_sequence = None;
    }

    pub fn expected_session(&self) -> Option<u8> {
        self.expected_session
    }

    /// Classify and count one decoded frame of `wire_len` bytes.
    pub fn observe_frame(&mut self, frame: &Frame, wire_len: usize) -> Observation {
        self.count_link_flags(frame.status);

        let mut boundary = false;
        match (self.policy, self.expected_session) {
            (_, None) => self.expected_session = Some(frame.session_id),
            (_, Some(expected)) if expected == frame.session_id => {}
            (SessionPolicy::Strict, Some(expected)) => {
                self.stats.session_mismatch = self.stats.session_mismatch.saturating_add(1);
                trace!(expected, found = frame.session_id, "Dropping stale-session frame");
                return Observation::Stale;
            }
            (SessionPolicy::Follow, Some(previous)) => {
                debug!(previous, next = frame.session_id, "Session boundary");
                self.expected_session = Some(frame.session_id);
                self.last_sequence = None;
                self.session_boundaries = self.session_boundaries.saturating_add(1);
                boundary = true;
            }
        }

        if let Some(previous) = self.last_sequence {
            if frame.sequence != previous.wrapping_add(1) {
                self.stats.err_count = self.stats.err_count.saturating_add(1);
                trace!(previous, sequence = frame.sequence, "Sequence gap");
            }
        }
        self.last_sequence = Some(frame.sequence);
        self.last_timestamp = Some(frame.timestamp);

        self.stats.packet_count = self.stats.packet_count.saturating_add(1);
        self.stats.total_bytes += wire_len as u64;
        if frame.status.is_trigger() {
            self.stats.triggers = self.stats.triggers.saturating_add(1);
        }

        Observation::Accepted { boundary }
    }

    /// Count a framing fault reported by the scanner.
    pub fn observe_fault(&mut self, kind: FaultKind) {
        match kind {
            FaultKind::BadMagic => self.stats.err_bad_magic = self.stats.err_bad_magic.saturating_add(1),
            FaultKind::BadCrc => self.stats.err_bad_crc = self.stats.err_bad_crc.saturating_add(1),
        }
    }

    /// Count packets dropped from a full host-side queue.
    pub fn observe_host_drop(&mut self, count: u32) {
        self.stats.host_dropped = self.stats.host_dropped.saturating_add(count);
    }

    /// Zero all counters and forget continuity state. The policy is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// Non-destructive copy of the counters.
    pub fn snapshot(&self) -> DiagStats {
        self.stats
    }

    /// Timestamp of the most recent accepted frame.
    pub fn last_timestamp(&self) -> Option<u32> {
        self.last_timestamp
    }

    /// Session changes seen under [`SessionPolicy::Follow`].
    pub fn session_boundaries(&self) -> u32 {
        self.session_boundaries
    }

    fn count_link_flags(&mut self, status: StatusFlags) {
        if !status.has_link_error() {
            return;
        }
        let counters = [
            (StatusFlags::SERDES_ERROR, &mut self.stats.err_serdes),
            (StatusFlags::LOCK_LOSS, &mut self.stats.err_lock),
            (StatusFlags::POP_UNDERFLOW, &mut self.stats.err_pop),
            (StatusFlags::SYNC_ERROR, &mut self.stats.err_sync),
        ];
        for (flag, counter) in counters {
            if status.has_flag(flag) {
                *counter = counter.saturating_add(1);
            }
        }
    }
}
