//! Emulated basestation producing synthetic probe data
//!
//! While buffering, each receive produces a burst of ticks. A tick is one
//! frame per open probe sharing a timestamp; the sequence counter is global
//! across probes, as on the hardware. A tick larger than the receive size is
//! handed out over several receives, like any FIFO read.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{Backend, BasestationId, Transport};
use crate::codec::{MAX_CHANNELS, MAX_PROBES, encode_into, frame_len, pack_samples};
use crate::types::{Frame, StatusFlags, SyncSettings};
use crate::{AcquisitionError, Result};

/// Synthetic data pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmulatorMode {
    /// No data is generated
    #[default]
    Off,
    /// Each sample holds its channel number
    Static,
    /// Per-channel ramp, one sample shift between neighbouring channels
    Linear,
}

impl EmulatorMode {
    /// Sample value for `channel` at `timestamp`.
    pub fn sample(self, channel: usize, timestamp: u32) -> i16 {
        match self {
            EmulatorMode::Off => 0,
            EmulatorMode::Static => channel as i16,
            EmulatorMode::Linear => ((timestamp as usize + channel) % 4096) as i16 - 2048,
        }
    }
}

/// Shape of the emulated acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    pub mode: EmulatorMode,
    /// Channels per frame
    pub channels: usize,
    /// Probes streaming, numbered from 0
    pub probes: u8,
    /// Ticks generated per receive call
    pub ticks_per_receive: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self { mode: EmulatorMode::Linear, channels: 64, probes: 1, ticks_per_receive: 16 }
    }
}

#[derive(Debug)]
struct EmulatorState {
    config: EmulatorConfig,
    buffering: Option<u8>,
    sequence: u16,
    timestamp: u32,
    first_tick: bool,
    backlog: Vec<u8>,
    sync: SyncSettings,
    closed: bool,
}

/// Basestation with no hardware behind it.
#[derive(Debug)]
pub struct EmulatedBasestation {
    id: BasestationId,
    state: Mutex<EmulatorState>,
}

impl EmulatedBasestation {
    pub fn new(id: BasestationId, config: EmulatorConfig) -> Result<Self> {
        validate(&config)?;
        Ok(Self {
            id,
            state: Mutex::new(EmulatorState {
                config,
                buffering: None,
                sequence: 0,
                timestamp: 0,
                first_tick: true,
                backlog: Vec::new(),
                sync: SyncSettings::default(),
                closed: false,
            }),
        })
    }

    pub fn config(&self) -> EmulatorConfig {
        self.state.lock().config
    }

    pub fn sync_settings(&self) -> SyncSettings {
        self.state.lock().sync
    }

    /// Append up to `max_bytes` of generated data to `buf`.
    ///
    /// Whole ticks are produced while they fit. When not even one does, a
    /// single tick goes to the backlog and is drained piecewise.
    fn generate(state: &mut EmulatorState, buf: &mut Vec<u8>, max_bytes: usize) -> usize {
        if state.backlog.is_empty() {
            let Some(session_id) = state.buffering else {
                return 0;
            };
            let config = state.config;
            let tick_bytes = frame_len(config.channels) * config.probes as usize;
            if config.mode == EmulatorMode::Off || tick_bytes == 0 || max_bytes == 0 {
                return 0;
            }

            let ticks = (max_bytes / tick_bytes).min(config.ticks_per_receive as usize);
            if ticks > 0 {
                let start = buf.len();
                for _ in 0..ticks {
                    Self::push_tick(state, session_id, buf);
                }
                return buf.len() - start;
            }

            let mut tick = Vec::with_capacity(tick_bytes);
            Self::push_tick(state, session_id, &mut tick);
            state.backlog = tick;
        }

        let take = state.backlog.len().min(max_bytes);
        buf.extend(state.backlog.drain(..take));
        take
    }

    /// Encode one frame per probe at the current timestamp.
    fn push_tick(state: &mut EmulatorState, session_id: u8, buf: &mut Vec<u8>) {
        let config = state.config;
        let samples: Vec<i16> = (0..config.channels).map(|c| config.mode.sample(c, state.timestamp)).collect();
        let payload = pack_samples(&samples);
        let status = if state.first_tick { StatusFlags::TRIGGER } else { 0 };

        for probe in 0..config.probes {
            let frame = Frame::new(
                state.sequence,
                state.timestamp,
                StatusFlags::new(status),
                session_id,
                probe,
                payload.clone(),
            );
            encode_into(&frame, buf);
            state.sequence = state.sequence.wrapping_add(1);
        }
        state.first_tick = false;
        state.timestamp = state.timestamp.wrapping_add(1);
    }
}

fn validate(config: &EmulatorConfig) -> Result<()> {
    if config.channels == 0 || config.channels > MAX_CHANNELS {
        return Err(AcquisitionError::parameter_invalid(
            "channels",
            format!("{} is outside 1..={MAX_CHANNELS}", config.channels),
        ));
    }
    if config.probes == 0 || config.probes > MAX_PROBES {
        return Err(AcquisitionError::parameter_invalid(
            "probes",
            format!("{} is outside 1..={MAX_PROBES}", config.probes),
        ));
    }
    if config.ticks_per_receive == 0 {
        return Err(AcquisitionError::parameter_invalid("ticks_per_receive", "must be greater than zero"));
    }
    Ok(())
}

#[async_trait::async_trait]
impl Transport for EmulatedBasestation {
    fn id(&self) -> BasestationId {
        self.id
    }

    async fn receive(&self, buf: &mut Vec<u8>, max_bytes: usize, timeout: Duration) -> Result<usize> {
        let produced = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AcquisitionError::transport_failed(format!("{} is closed", self.id)));
            }
            Self::generate(&mut state, buf, max_bytes)
        };

        if produced == 0 {
            tokio::time::sleep(timeout).await;
        } else {
            tokio::task::yield_now().await;
        }
        Ok(produced)
    }

    async fn start_buffering(&self, session_id: u8) -> Result<()> {
        let mut state = self.state.lock();
        state.buffering = Some(session_id);
        state.sequence = 0;
        state.timestamp = 0;
        state.first_tick = true;
        state.backlog.clear();
        debug!(device = %self.id, session_id, mode = ?state.config.mode, "Emulator buffering started");
        Ok(())
    }

    async fn stop_buffering(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.buffering = None;
        state.backlog.clear();
        Ok(())
    }

    async fn apply_sync(&self, settings: &SyncSettings) -> Result<()> {
        self.state.lock().sync = *settings;
        Ok(())
    }

    fn set_emulator_mode(&self, mode: EmulatorMode) -> Result<()> {
        self.state.lock().config.mode = mode;
        info!(device = %self.id, ?mode, "Emulator mode changed");
        Ok(())
    }

    fn emulator_mode(&self) -> EmulatorMode {
        self.state.lock().config.mode
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Backend exposing a fixed set of emulated basestations.
#[derive(Debug, Default)]
pub struct EmulatorBackend {
    devices: Vec<(BasestationId, EmulatorConfig)>,
}

impl EmulatorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an emulated basestation with the given serial number.
    pub fn with_device(mut self, serial: u32, config: EmulatorConfig) -> Self {
        self.devices.push((BasestationId::usb(serial), config));
        self
    }
}

impl Backend for EmulatorBackend {
    fn scan(&self) -> Result<Vec<BasestationId>> {
        Ok(self.devices.iter().map(|(id, _)| *id).collect())
    }

    fn open(&self, id: &BasestationId) -> Result<Arc<dyn Transport>> {
        let (id, config) = self
            .devices
            .iter()
            .find(|(candidate, _)| candidate == id)
            .ok_or(AcquisitionError::DeviceNotFound { serial: Some(id.serial) })?;
        Ok(Arc::new(EmulatedBasestation::new(*id, *config)?))
    }
}
