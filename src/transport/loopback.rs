//! In-memory basestation fed by the caller
//!
//! The feeder side stands in for the hardware writing into its FIFO; the
//! transport side is what the acquisition core reads from.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{Backend, BasestationId, Transport};
use crate::types::SyncSettings;
use crate::{AcquisitionError, Result};

/// Default FIFO size in bytes.
pub const DEFAULT_FIFO_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug)]
struct Fifo {
    bytes: VecDeque<u8>,
    capacity: usize,
    buffering: Option<u8>,
    sync: Option<SyncSettings>,
    flushes: u32,
}

#[derive(Debug)]
struct Shared {
    fifo: Mutex<Fifo>,
    data_ready: Notify,
    closed: AtomicBool,
}

/// Transport half of a loopback device.
#[derive(Debug)]
pub struct LoopbackTransport {
    id: BasestationId,
    shared: Arc<Shared>,
}

/// Producer half of a loopback device.
#[derive(Debug, Clone)]
pub struct LoopbackFeeder {
    shared: Arc<Shared>,
}

/// Create a connected transport/feeder pair.
pub fn pair(id: BasestationId, capacity: usize) -> (LoopbackTransport, LoopbackFeeder) {
    let shared = Arc::new(Shared {
        fifo: Mutex::new(Fifo {
            bytes: VecDeque::new(),
            capacity,
            buffering: None,
            sync: None,
            flushes: 0,
        }),
        data_ready: Notify::new(),
        closed: AtomicBool::new(false),
    });
    (LoopbackTransport { id, shared: Arc::clone(&shared) }, LoopbackFeeder { shared })
}

impl LoopbackFeeder {
    /// Write bytes into the FIFO, returning how many fit.
    ///
    /// Bytes beyond the FIFO capacity are dropped, as the hardware would.
    pub fn push(&self, bytes: &[u8]) -> usize {
        let accepted = {
            let mut fifo = self.shared.fifo.lock();
            let room = fifo.capacity.saturating_sub(fifo.bytes.len());
            let accepted = room.min(bytes.len());
            fifo.bytes.extend(&bytes[..accepted]);
            accepted
        };
        if accepted < bytes.len() {
            warn!(dropped = bytes.len() - accepted, "Loopback FIFO full, dropping bytes");
        }
        if accepted > 0 {
            self.shared.data_ready.notify_one();
        }
        accepted
    }

    /// Session buffering was started for, if active.
    pub fn buffering_session(&self) -> Option<u8> {
        self.shared.fifo.lock().buffering
    }

    /// Times the FIFO was flushed by `stop_buffering`.
    pub fn flush_count(&self) -> u32 {
        self.shared.fifo.lock().flushes
    }

    /// Last sync settings pushed by the device.
    pub fn sync_settings(&self) -> Option<SyncSettings> {
        self.shared.fifo.lock().sync
    }

    /// Bytes waiting in the FIFO.
    pub fn pending(&self) -> usize {
        self.shared.fifo.lock().bytes.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    fn id(&self) -> BasestationId {
        self.id
    }

    async fn receive(&self, buf: &mut Vec<u8>, max_bytes: usize, timeout: Duration) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(AcquisitionError::transport_failed(format!("{} is closed", self.id)));
            }

            {
                let mut fifo = self.shared.fifo.lock();
                if !fifo.bytes.is_empty() {
                    let count = max_bytes.min(fifo.bytes.len());
                    buf.extend(fifo.bytes.drain(..count));
                    return Ok(count);
                }
            }

            if tokio::time::timeout_at(deadline, self.shared.data_ready.notified()).await.is_err() {
                return Ok(0);
            }
        }
    }

    async fn start_buffering(&self, session_id: u8) -> Result<()> {
        self.shared.fifo.lock().buffering = Some(session_id);
        debug!(device = %self.id, session_id, "Loopback buffering started");
        Ok(())
    }

    async fn stop_buffering(&self) -> Result<()> {
        let mut fifo = self.shared.fifo.lock();
        fifo.buffering = None;
        fifo.bytes.clear();
        fifo.flushes += 1;
        Ok(())
    }

    async fn apply_sync(&self, settings: &SyncSettings) -> Result<()> {
        self.shared.fifo.lock().sync = Some(*settings);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.data_ready.notify_one();
        Ok(())
    }
}

/// Backend whose devices are loopback pairs registered by the caller.
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    devices: Mutex<HashMap<u32, Arc<LoopbackTransport>>>,
    order: Mutex<Vec<u32>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device with the default FIFO size and return its feeder.
    pub fn add_device(&self, serial: u32) -> LoopbackFeeder {
        self.add_device_with_capacity(serial, DEFAULT_FIFO_BYTES)
    }

    pub fn add_device_with_capacity(&self, serial: u32, capacity: usize) -> LoopbackFeeder {
        let (transport, feeder) = pair(BasestationId::usb(serial), capacity);
        if self.devices.lock().insert(serial, Arc::new(transport)).is_none() {
            self.order.lock().push(serial);
        }
        feeder
    }
}

impl Backend for LoopbackBackend {
    fn scan(&self) -> Result<Vec<BasestationId>> {
        Ok(self.order.lock().iter().map(|&s| BasestationId::usb(s)).collect())
    }

    fn open(&self, id: &BasestationId) -> Result<Arc<dyn Transport>> {
        let transport = self
            .devices
            .lock()
            .get(&id.serial)
            .cloned()
            .ok_or(AcquisitionError::DeviceNotFound { serial: Some(id.serial) })?;
        transport.shared.closed.store(false, Ordering::Release);
        Ok(transport)
    }
}
