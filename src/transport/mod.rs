//! Basestation transport boundary
//!
//! A [`Transport`] is the byte pipe to one opened basestation: it delivers
//! raw FIFO contents and accepts the few control commands acquisition needs.
//! A [`Backend`] discovers basestations and opens transports to them.
//!
//! Two backends ship with the crate:
//! - [`loopback`] - byte FIFO fed by the caller, used to inject arbitrary streams
//! - [`emulator`] - self-contained basestation generating synthetic probe data

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::types::SyncSettings;
use crate::{AcquisitionError, Result};

pub mod emulator;
pub mod loopback;

pub use emulator::{EmulatedBasestation, EmulatorBackend, EmulatorConfig, EmulatorMode};
pub use loopback::{LoopbackBackend, LoopbackFeeder, LoopbackTransport};

/// Link type a basestation is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlatformId {
    #[default]
    Usb,
}

/// Identity of a discovered basestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasestationId {
    pub platform: PlatformId,
    pub serial: u32,
}

impl BasestationId {
    pub fn usb(serial: u32) -> Self {
        Self { platform: PlatformId::Usb, serial }
    }
}

impl fmt::Display for BasestationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.platform, self.serial)
    }
}

/// Byte pipe to one opened basestation.
///
/// Implementations are shared between the reading task and control calls, so
/// every method takes `&self`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    fn id(&self) -> BasestationId;

    /// Append up to `max_bytes` of FIFO data to `buf`.
    ///
    /// Waits at most `timeout` for data and returns the number of bytes
    /// appended; `Ok(0)` means nothing arrived in time. A zero timeout polls.
    async fn receive(&self, buf: &mut Vec<u8>, max_bytes: usize, timeout: Duration) -> Result<usize>;

    /// Enable FIFO buffering for a recording session.
    async fn start_buffering(&self, session_id: u8) -> Result<()>;

    /// Disable buffering and flush the FIFO.
    async fn stop_buffering(&self) -> Result<()>;

    /// Push sync clock and trigger routing to the hardware.
    async fn apply_sync(&self, _settings: &SyncSettings) -> Result<()> {
        Ok(())
    }

    fn set_emulator_mode(&self, _mode: EmulatorMode) -> Result<()> {
        Err(AcquisitionError::NotSupported { feature: "device emulation".to_string() })
    }

    fn emulator_mode(&self) -> EmulatorMode {
        EmulatorMode::Off
    }

    /// Release the link. Later receives fail.
    async fn close(&self) -> Result<()>;
}

/// Discovery and opening of basestations on one platform.
pub trait Backend: Send + Sync + 'static {
    /// List basestations currently attached.
    fn scan(&self) -> Result<Vec<BasestationId>>;

    /// Open a transport to a discovered basestation.
    fn open(&self, id: &BasestationId) -> Result<Arc<dyn Transport>>;
}
