//! Acquisition state machine
//!
//! ```text
//!            arm                trigger
//!   Idle ----------> Armed ---------------> Recording
//!    ^                 |                        |
//!    +------ arm ------+----------- arm --------+
//! ```
//!
//! The machine only decides transitions and keeps session bookkeeping. The
//! owning device applies the transport side effects a [`Transition`] implies.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostics, SessionPolicy};
use crate::types::{SyncSettings, TriggerMode};

/// Acquisition phase of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Armed,
    Recording,
}

/// Origin of a start trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Software,
    Hardware,
}

/// Result of a state machine input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle -> Armed, waiting for a trigger
    Armed { session_id: u8 },
    /// Armed or Recording -> Idle; buffering must stop and the FIFO be flushed
    Disarmed { from: AcquisitionState },
    /// Armed -> Recording; buffering must start for the session
    Triggered { session_id: u8 },
    /// Input had no effect in the current state
    Ignored,
}

/// Arm/trigger state with session and timestamp bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionMachine {
    state: AcquisitionState,
    next_session: u8,
    current_session: Option<u8>,
    trigger_mode: TriggerMode,
    timestamp: u32,
    epoch: u64,
}

impl AcquisitionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Toggle between Idle and Armed; disarms from Recording too.
    ///
    /// Arming resets `diagnostics` and points it at the new session.
    pub fn arm(&mut self, diagnostics: &mut Diagnostics) -> Transition {
        self.epoch += 1;
        match self.state {
            AcquisitionState::Idle => {
                let session_id = self.next_session;
                diagnostics.reset();
                diagnostics.expect_session(session_id);
                self.current_session = Some(session_id);
                self.timestamp = 0;
                self.state = AcquisitionState::Armed;
                info!(session_id, "Armed");
                Transition::Armed { session_id }
            }
            from => {
                self.state = AcquisitionState::Idle;
                self.timestamp = 0;
                self.current_session = None;
                self.next_session = self.next_session.wrapping_add(1);
                info!(?from, next_session = self.next_session, "Disarmed");
                Transition::Disarmed { from }
            }
        }
    }

    /// Session a trigger from `source` would start recording, if accepted.
    pub fn accepts_trigger(&self, source: TriggerSource) -> Option<u8> {
        if self.state != AcquisitionState::Armed {
            return None;
        }
        if source == TriggerSource::Hardware && self.trigger_mode != TriggerMode::Slave {
            return None;
        }
        Some(self.current_session.unwrap_or(self.next_session))
    }

    /// Start recording if armed and the trigger source is accepted.
    pub fn trigger(&mut self, source: TriggerSource) -> Transition {
        let Some(session_id) = self.accepts_trigger(source) else {
            debug!(?source, state = ?self.state, trigger_mode = ?self.trigger_mode, "Trigger ignored");
            return Transition::Ignored;
        };

        self.state = AcquisitionState::Recording;
        info!(session_id, ?source, "Recording");
        Transition::Triggered { session_id }
    }

    /// Record the timestamp of an accepted frame.
    pub fn observe_timestamp(&mut self, timestamp: u32) {
        if self.state == AcquisitionState::Recording {
            self.timestamp = timestamp;
        }
    }

    /// Latest frame timestamp while recording, 0 otherwise.
    pub fn timestamp(&self) -> u32 {
        match self.state {
            AcquisitionState::Recording => self.timestamp,
            _ => 0,
        }
    }

    /// Session being armed or recorded.
    pub fn current_session(&self) -> Option<u8> {
        self.current_session
    }

    /// Session id the next arm will use.
    pub fn next_session(&self) -> u8 {
        self.next_session
    }

    /// Counter bumped on every arm transition.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.trigger_mode
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) {
        self.trigger_mode = mode;
    }
}

/// Per-device state shared by control calls and the reading source.
#[derive(Debug)]
pub struct ControlState {
    pub machine: AcquisitionMachine,
    pub diagnostics: Diagnostics,
    pub sync: SyncSettings,
    pub read_timeout: Duration,
}

/// Handle to the control state of one device.
pub type SharedControl = Arc<Mutex<ControlState>>;

impl ControlState {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            machine: AcquisitionMachine::new(),
            diagnostics: Diagnostics::new(SessionPolicy::Strict),
            sync: SyncSettings::default(),
            read_timeout,
        }
    }

    pub fn shared(read_timeout: Duration) -> SharedControl {
        Arc::new(Mutex::new(Self::new(read_timeout)))
    }

    /// Toggle arming with the device diagnostics.
    pub fn arm(&mut self) -> Transition {
        self.machine.arm(&mut self.diagnostics)
    }
}
