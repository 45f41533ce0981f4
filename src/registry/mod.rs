//! Device and stream handle registry
//!
//! Handles are `(index, generation)` pairs resolved through a
//! generation-checked arena, so a destroyed handle can never reach a device
//! opened later in the same slot. Each serial number maps to at most one open
//! device.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use viperstream::registry::{DeviceSelector, Registry};
//! use viperstream::transport::{EmulatorBackend, EmulatorConfig};
//!
//! # async fn run() -> viperstream::Result<()> {
//! let backend = EmulatorBackend::new().with_device(1234, EmulatorConfig::default());
//! let registry = Registry::new(Arc::new(backend));
//!
//! let handle = registry.create(DeviceSelector::Any)?;
//! registry.arm(handle).await?;
//! registry.software_trigger(handle).await?;
//!
//! let batch = registry.read_packets(handle, 0, 64, 100).await?;
//! println!("{} packets, {:?}", batch.len(), registry.read_diag_stats(handle)?);
//!
//! registry.destroy(handle).await?;
//! # Ok(())
//! # }
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::acquisition::{AcquisitionState, Transition};
use crate::config::AcquisitionConfig;
use crate::error::HandleKind;
use crate::source::{FileSource, PacketBatch, ReadRequest, ReadStatus};
use crate::transport::{Backend, BasestationId};
use crate::types::{DiagStats, PacketInfo};
use crate::{AcquisitionError, Result};

mod arena;
mod device;

pub use arena::{HandleArena, SlotKey};
pub use device::{Device, DeviceInfo};

/// Opaque reference to an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(SlotKey);

/// Opaque reference to an open capture file stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(SlotKey);

impl DeviceHandle {
    pub fn key(&self) -> SlotKey {
        self.0
    }
}

impl StreamHandle {
    pub fn key(&self) -> SlotKey {
        self.0
    }
}

/// Which basestation [`Registry::create`] should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    Serial(u32),
    /// First discovered basestation without an open handle
    Any,
}

impl DeviceSelector {
    /// Interpret a raw serial number, where 0 and -1 mean any device.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            0 | -1 => Ok(DeviceSelector::Any),
            n => u32::try_from(n).map(DeviceSelector::Serial).map_err(|_| {
                AcquisitionError::parameter_invalid("serial", format!("{n} is not a valid serial number"))
            }),
        }
    }
}

type SharedStream = Arc<Mutex<FileSource>>;

/// What a serial number is currently mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SerialSlot {
    Open(DeviceHandle),
    /// Handle destroyed, transport not yet closed
    Closing,
}

/// Owner of every open device and capture stream.
pub struct Registry {
    backend: Arc<dyn Backend>,
    config: AcquisitionConfig,
    devices: RwLock<HandleArena<Arc<Device>>>,
    by_serial: Mutex<HashMap<u32, SerialSlot>>,
    streams: Mutex<HandleArena<SharedStream>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("devices", &self.devices.read().len())
            .field("streams", &self.streams.lock().len())
            .field("config", &self.config)
            .finish()
    }
}

impl Registry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_config(backend, AcquisitionConfig::default())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: AcquisitionConfig) -> Self {
        Self {
            backend,
            config,
            devices: RwLock::new(HandleArena::new()),
            by_serial: Mutex::new(HashMap::new()),
            streams: Mutex::new(HandleArena::new()),
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Basestations the backend currently discovers.
    pub fn scan(&self) -> Result<Vec<BasestationId>> {
        self.backend.scan()
    }

    /// Open a device, or return the existing handle if its serial is open.
    ///
    /// A serial whose previous handle is still closing fails with
    /// [`AcquisitionError::DeviceBusy`]; `Any` skips such devices.
    pub fn create(&self, selector: DeviceSelector) -> Result<DeviceHandle> {
        let mut by_serial = self.by_serial.lock();

        if let DeviceSelector::Serial(serial) = selector {
            match by_serial.get(&serial) {
                Some(&SerialSlot::Open(handle)) => {
                    debug!(serial, "Device already open");
                    return Ok(handle);
                }
                Some(SerialSlot::Closing) => return Err(AcquisitionError::DeviceBusy { serial }),
                None => {}
            }
        }

        let discovered = self.backend.scan()?;
        let id = match selector {
            DeviceSelector::Serial(serial) => discovered
                .into_iter()
                .find(|id| id.serial == serial)
                .ok_or(AcquisitionError::DeviceNotFound { serial: Some(serial) })?,
            DeviceSelector::Any => discovered
                .into_iter()
                .find(|id| !by_serial.contains_key(&id.serial))
                .ok_or(AcquisitionError::DeviceNotFound { serial: None })?,
        };

        let transport = self.backend.open(&id)?;
        let device = Arc::new(Device::open(transport, &self.config));
        let handle = DeviceHandle(self.devices.write().insert(device));
        by_serial.insert(id.serial, SerialSlot::Open(handle));
        info!(device = %id, ?handle, "Device handle created");
        Ok(handle)
    }

    /// Close a device and invalidate its handle.
    ///
    /// An in-flight read on the device ends with an invalid handle error.
    pub async fn destroy(&self, handle: DeviceHandle) -> Result<()> {
        let device = {
            let mut by_serial = self.by_serial.lock();
            let device = self
                .devices
                .write()
                .remove(handle.0)
                .ok_or_else(|| AcquisitionError::invalid_handle(HandleKind::Device))?;
            by_serial.insert(device.id().serial, SerialSlot::Closing);
            device
        };

        let result = device.close().await;

        // The serial stays reserved until the transport is released
        self.by_serial.lock().remove(&device.id().serial);
        info!(device = %device.id(), "Device handle destroyed");
        result
    }

    /// Resolve a handle to its device.
    pub fn lookup(&self, handle: DeviceHandle) -> Result<Arc<Device>> {
        self.devices
            .read()
            .get(handle.0)
            .cloned()
            .ok_or_else(|| AcquisitionError::invalid_handle(HandleKind::Device))
    }

    /// Handles of all open devices.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.devices.read().iter().map(|(key, _)| DeviceHandle(key)).collect()
    }

    /// Destroy every device and close every stream.
    pub async fn shutdown(&self) -> Result<()> {
        for handle in self.devices() {
            self.destroy(handle).await?;
        }
        *self.streams.lock() = HandleArena::new();
        Ok(())
    }

    // Device operations by handle

    pub async fn arm(&self, handle: DeviceHandle) -> Result<Transition> {
        self.lookup(handle)?.arm().await
    }

    pub async fn software_trigger(&self, handle: DeviceHandle) -> Result<Transition> {
        self.lookup(handle)?.software_trigger().await
    }

    pub fn acquisition_state(&self, handle: DeviceHandle) -> Result<AcquisitionState> {
        Ok(self.lookup(handle)?.acquisition_state())
    }

    pub fn timestamp(&self, handle: DeviceHandle) -> Result<u32> {
        Ok(self.lookup(handle)?.timestamp())
    }

    pub fn read_diag_stats(&self, handle: DeviceHandle) -> Result<DiagStats> {
        Ok(self.lookup(handle)?.read_diag_stats())
    }

    pub async fn read_packets(
        &self,
        handle: DeviceHandle,
        probe: u8,
        channel_count: usize,
        max_packets: usize,
    ) -> Result<PacketBatch> {
        self.lookup(handle)?.read_packets(probe, channel_count, max_packets).await
    }

    pub async fn read_packets_into(
        &self,
        handle: DeviceHandle,
        probe: u8,
        infos: &mut [PacketInfo],
        samples: &mut [i16],
        channel_count: usize,
    ) -> Result<(usize, ReadStatus)> {
        self.lookup(handle)?.read_packets_into(probe, infos, samples, channel_count).await
    }

    pub fn set_read_timeout(&self, handle: DeviceHandle, timeout: Duration) -> Result<()> {
        self.lookup(handle)?.set_read_timeout(timeout);
        Ok(())
    }

    pub fn info(&self, handle: DeviceHandle) -> Result<DeviceInfo> {
        Ok(self.lookup(handle)?.info())
    }

    // Capture file streams

    /// Open a capture file for replay of one probe.
    pub fn stream_open<P: AsRef<Path>>(&self, path: P, probe: u8) -> Result<StreamHandle> {
        let source = FileSource::open(path, probe, self.config.file_chunk_bytes)?;
        let key = self.streams.lock().insert(Arc::new(Mutex::new(source)));
        Ok(StreamHandle(key))
    }

    fn stream(&self, handle: StreamHandle) -> Result<SharedStream> {
        self.streams
            .lock()
            .get(handle.0)
            .cloned()
            .ok_or_else(|| AcquisitionError::invalid_handle(HandleKind::Stream))
    }

    /// Read the next packets from a capture file.
    pub fn stream_read(&self, handle: StreamHandle, channel_count: usize, max_packets: usize) -> Result<PacketBatch> {
        let stream = self.stream(handle)?;
        let mut source = stream.lock();
        let probe = source.probe();
        source.read(ReadRequest::new(probe, channel_count, max_packets))
    }

    pub fn stream_read_into(
        &self,
        handle: StreamHandle,
        infos: &mut [PacketInfo],
        samples: &mut [i16],
        channel_count: usize,
    ) -> Result<(usize, ReadStatus)> {
        self.stream(handle)?.lock().read_into(infos, samples, channel_count)
    }

    /// Counters accumulated while replaying a capture file.
    pub fn stream_diag_stats(&self, handle: StreamHandle) -> Result<DiagStats> {
        Ok(self.stream(handle)?.lock().diag_stats())
    }

    pub fn stream_close(&self, handle: StreamHandle) -> Result<()> {
        self.streams
            .lock()
            .remove(handle.0)
            .map(|_| ())
            .ok_or_else(|| AcquisitionError::invalid_handle(HandleKind::Stream))
    }
}
