//! One opened basestation: acquisition control, diagnostics and packet reads

use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acquisition::{AcquisitionState, ControlState, SharedControl, Transition, TriggerSource};
use crate::config::AcquisitionConfig;
use crate::error::HandleKind;
use crate::source::{
    CaptureWriter, LiveSource, PacketBatch, ReadRequest, ReadStatus, StreamSource, check_buffers,
};
use crate::transport::{BasestationId, EmulatorMode, Transport};
use crate::types::{DiagStats, PacketInfo, SyncClock, SyncMode, SyncSettings, TriggerMode};
use crate::{AcquisitionError, Result};

/// Summary of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: BasestationId,
    pub state: AcquisitionState,
    pub capturing: bool,
    pub emulator_mode: EmulatorMode,
}

/// An opened basestation.
///
/// Control calls may run concurrently with a read; reads are serialised
/// among themselves. Control calls are serialised too, and a state change is
/// committed only once the transport has accepted the matching command.
pub struct Device {
    id: BasestationId,
    transport: Arc<dyn Transport>,
    control: SharedControl,
    control_gate: tokio::sync::Mutex<()>,
    source: tokio::sync::Mutex<Option<StreamSource>>,
    capture_path: Mutex<Option<PathBuf>>,
    capturing: AtomicBool,
    state_tx: watch::Sender<AcquisitionState>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("state", &self.acquisition_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Device {
    /// Wrap an opened transport.
    pub fn open(transport: Arc<dyn Transport>, config: &AcquisitionConfig) -> Self {
        let id = transport.id();
        let control = ControlState::shared(config.read_timeout());
        let cancel = CancellationToken::new();
        let live = LiveSource::new(
            Arc::clone(&transport),
            Arc::clone(&control),
            cancel.clone(),
            config.probe_queue_capacity,
            config.receive_chunk_bytes,
        );
        let (state_tx, _) = watch::channel(AcquisitionState::Idle);
        info!(device = %id, "Device opened");

        Self {
            id,
            transport,
            control,
            control_gate: tokio::sync::Mutex::new(()),
            source: tokio::sync::Mutex::new(Some(StreamSource::Live(live))),
            capture_path: Mutex::new(None),
            capturing: AtomicBool::new(false),
            state_tx,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> BasestationId {
        self.id
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            state: self.acquisition_state(),
            capturing: self.capturing.load(Ordering::Acquire),
            emulator_mode: self.transport.emulator_mode(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AcquisitionError::invalid_handle(HandleKind::Device));
        }
        Ok(())
    }

    // Acquisition control

    /// Toggle arming. Disarming stops buffering and flushes the FIFO.
    pub async fn arm(&self) -> Result<Transition> {
        self.ensure_open()?;
        let _gate = self.control_gate.lock().await;
        if self.acquisition_state() != AcquisitionState::Idle {
            self.transport.stop_buffering().await?;
        }
        let transition = self.control.lock().arm();
        self.publish_state();
        Ok(transition)
    }

    /// Start recording if armed.
    pub async fn software_trigger(&self) -> Result<Transition> {
        self.trigger(TriggerSource::Software).await
    }

    /// External trigger edge, honoured only in slave trigger mode.
    pub async fn hardware_trigger(&self) -> Result<Transition> {
        self.trigger(TriggerSource::Hardware).await
    }

    async fn trigger(&self, source: TriggerSource) -> Result<Transition> {
        self.ensure_open()?;
        let _gate = self.control_gate.lock().await;
        let accepted = self.control.lock().machine.accepts_trigger(source);
        if let Some(session_id) = accepted {
            self.transport.start_buffering(session_id).await?;
        }

        let transition = self.control.lock().machine.trigger(source);
        if let Transition::Triggered { .. } = transition {
            self.publish_state();
        }
        Ok(transition)
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.control.lock().machine.state()
    }

    /// Latest frame timestamp while recording, 0 otherwise.
    pub fn timestamp(&self) -> u32 {
        self.control.lock().machine.timestamp()
    }

    /// Acquisition state changes, starting with the current state.
    pub fn state_updates(&self) -> impl Stream<Item = AcquisitionState> + 'static {
        WatchStream::new(self.state_tx.subscribe())
    }

    fn publish_state(&self) {
        let state = self.acquisition_state();
        self.state_tx.send_replace(state);
    }

    // Diagnostics and reads

    pub fn read_diag_stats(&self) -> DiagStats {
        self.control.lock().diagnostics.snapshot()
    }

    /// Read up to `max_packets` packets of `probe`.
    ///
    /// Waits at most the read timeout for the first packet. A capture write
    /// failure is reported once in the batch status and capture is suspended.
    pub async fn read_packets(&self, probe: u8, channel_count: usize, max_packets: usize) -> Result<PacketBatch> {
        self.ensure_open()?;
        let mut slot = self.source.lock().await;
        let source = slot.as_mut().ok_or_else(|| AcquisitionError::invalid_handle(HandleKind::Device))?;
        let batch = source.read(ReadRequest::new(probe, channel_count, max_packets)).await?;

        if let ReadStatus::CaptureFailed { .. } = batch.status {
            *slot = slot.take().map(StreamSource::without_capture);
            self.capturing.store(false, Ordering::Release);
        }
        Ok(batch)
    }

    /// Read into caller buffers, returning the packet count and status.
    pub async fn read_packets_into(
        &self,
        probe: u8,
        infos: &mut [PacketInfo],
        samples: &mut [i16],
        channel_count: usize,
    ) -> Result<(usize, ReadStatus)> {
        check_buffers(infos.len(), samples.len(), channel_count)?;
        let batch = self.read_packets(probe, channel_count, infos.len()).await?;
        let count = batch.copy_into(infos, samples)?;
        Ok((count, batch.status))
    }

    /// Continuous stream of non-empty batches.
    ///
    /// Ends after the first error, which is yielded; destroying the device
    /// therefore ends the stream with an invalid handle error.
    pub fn packets(
        self: &Arc<Self>,
        probe: u8,
        channel_count: usize,
        max_packets: usize,
    ) -> impl Stream<Item = Result<PacketBatch>> + 'static {
        let device = Arc::clone(self);
        futures::stream::unfold(Some(device), move |state| async move {
            let device = state?;
            loop {
                match device.read_packets(probe, channel_count, max_packets).await {
                    Ok(batch) if batch.is_empty() && batch.status == ReadStatus::Ok => {
                        tokio::task::yield_now().await;
                    }
                    Ok(batch) => return Some((Ok(batch), Some(device))),
                    Err(error) => return Some((Err(error), None)),
                }
            }
        })
    }

    // Capture

    /// Set the file used by the next [`enable_capture`](Self::enable_capture).
    pub fn set_capture_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.ensure_open()?;
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(AcquisitionError::parameter_invalid("path", "capture path is empty"));
        }
        *self.capture_path.lock() = Some(path);
        Ok(())
    }

    pub fn capture_path(&self) -> Option<PathBuf> {
        self.capture_path.lock().clone()
    }

    /// Start or stop teeing live packets into the capture file.
    pub async fn enable_capture(&self, enable: bool) -> Result<()> {
        self.ensure_open()?;
        let writer = if enable {
            let path = self
                .capture_path()
                .ok_or_else(|| AcquisitionError::parameter_invalid("path", "no capture path set"))?;
            Some(CaptureWriter::open(path)?)
        } else {
            None
        };

        let mut slot = self.source.lock().await;
        let source = slot.take().ok_or_else(|| AcquisitionError::invalid_handle(HandleKind::Device))?;
        *slot = Some(match writer {
            Some(writer) => source.with_capture(writer),
            None => source.without_capture(),
        });
        self.capturing.store(enable, Ordering::Release);
        debug!(device = %self.id, enable, "Capture toggled");
        Ok(())
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    // Sync clock and trigger routing

    /// Set the sync clock frequency, returning the frequency actually used.
    pub async fn set_sync_clock_frequency(&self, hz: f64) -> Result<f64> {
        let clock = SyncClock::from_frequency(hz)?;
        self.update_sync(|s| s.clock = clock).await?;
        Ok(clock.frequency())
    }

    pub fn sync_clock_frequency(&self) -> f64 {
        self.sync_settings().clock.frequency()
    }

    pub async fn set_sync_clock_period(&self, period_ms: u32) -> Result<()> {
        let clock = SyncClock::from_period_ms(period_ms)?;
        self.update_sync(|s| s.clock = clock).await
    }

    pub fn sync_clock_period(&self) -> u32 {
        self.sync_settings().clock.period_ms()
    }

    pub async fn set_sync_mode(&self, mode: SyncMode) -> Result<()> {
        self.update_sync(|s| s.sync_mode = mode).await
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_settings().sync_mode
    }

    pub async fn set_trigger_mode(&self, mode: TriggerMode) -> Result<()> {
        self.update_sync(|s| s.trigger_mode = mode).await
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.control.lock().machine.trigger_mode()
    }

    pub fn sync_settings(&self) -> SyncSettings {
        self.control.lock().sync
    }

    /// Push modified settings to the transport, committing them on success.
    async fn update_sync<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut SyncSettings),
    {
        self.ensure_open()?;
        let _gate = self.control_gate.lock().await;
        let mut settings = self.sync_settings();
        update(&mut settings);
        self.transport.apply_sync(&settings).await?;

        let mut control = self.control.lock();
        control.machine.set_trigger_mode(settings.trigger_mode);
        control.sync = settings;
        Ok(())
    }

    // Other settings

    pub fn set_read_timeout(&self, timeout: Duration) {
        self.control.lock().read_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Duration {
        self.control.lock().read_timeout
    }

    pub fn set_emulator_mode(&self, mode: EmulatorMode) -> Result<()> {
        self.ensure_open()?;
        self.transport.set_emulator_mode(mode)
    }

    pub fn emulator_mode(&self) -> EmulatorMode {
        self.transport.emulator_mode()
    }

    /// Cancel in-flight reads, stop acquisition and release the transport.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancel.cancel();

        if self.acquisition_state() != AcquisitionState::Idle {
            if let Err(error) = self.transport.stop_buffering().await {
                warn!(device = %self.id, %error, "Failed to stop buffering on close");
            }
        }

        // Waits for a cancelled read to release the source
        self.source.lock().await.take();
        self.capturing.store(false, Ordering::Release);
        self.transport.close().await?;
        info!(device = %self.id, "Device closed");
        Ok(())
    }
}
