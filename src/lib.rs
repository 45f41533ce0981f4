//! Acquisition core for multi-channel neural probe basestations.
//!
//! ViperStream decodes the basestation's framed sample stream, keeps running
//! link diagnostics, drives the arm/trigger acquisition cycle and hands out
//! packets from a live device, a capture file, or a live device teed into a
//! capture file.
//!
//! # Features
//!
//! - **Resynchronising codec**: CRC-checked frames recovered from arbitrary byte streams
//! - **Diagnostics**: framing, sequence, session and link-layer error counters
//! - **Capture and replay**: byte-exact capture files replayed through the same codec
//! - **Handles**: generation-checked device and stream handles, safe across threads
//! - **Emulation**: built-in emulated basestation for testing without hardware
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use viperstream::ViperStream;
//! use viperstream::registry::DeviceSelector;
//! use viperstream::transport::EmulatorConfig;
//!
//! #[tokio::main]
//! async fn main() -> viperstream::Result<()> {
//!     let registry = ViperStream::emulated(1234, EmulatorConfig::default())?;
//!     let handle = registry.create(DeviceSelector::Any)?;
//!
//!     registry.arm(handle).await?;
//!     registry.software_trigger(handle).await?;
//!
//!     let batch = registry.read_packets(handle, 0, 64, 256).await?;
//!     for index in 0..batch.len() {
//!         if let Some((info, samples)) = batch.packet(index) {
//!             println!("t={} first sample={}", info.timestamp, samples[0]);
//!         }
//!     }
//!
//!     registry.destroy(handle).await
//! }
//! ```

// Core types and error handling
pub mod codec;
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Acquisition pipeline
pub mod acquisition;
pub mod diagnostics;
pub mod registry;
pub mod source;
pub mod transport;

// Core exports
pub use config::AcquisitionConfig;
pub use error::*;
pub use types::*;

// Main API exports
pub use acquisition::{AcquisitionState, Transition};
pub use registry::{Device, DeviceHandle, DeviceSelector, Registry, StreamHandle};
pub use source::{FileSource, PacketBatch, ReadRequest, ReadStatus};

use std::path::Path;
use std::sync::Arc;

use transport::{Backend, EmulatorBackend, EmulatorConfig};

/// Unified entry point for basestation registries and capture replay.
///
/// # Examples
///
/// ## Emulated basestation
/// ```rust,no_run
/// use viperstream::ViperStream;
/// use viperstream::transport::EmulatorConfig;
///
/// let registry = ViperStream::emulated(1, EmulatorConfig::default())?;
/// assert_eq!(registry.scan()?.len(), 1);
/// # Ok::<(), viperstream::AcquisitionError>(())
/// ```
///
/// ## Capture file replay
/// ```rust,no_run
/// use viperstream::{ReadRequest, ViperStream};
///
/// let mut replay = ViperStream::open("session.bin", 0)?;
/// loop {
///     let batch = replay.read(ReadRequest::new(0, 64, 1024))?;
///     if batch.is_end_of_stream() {
///         break;
///     }
/// }
/// # Ok::<(), viperstream::AcquisitionError>(())
/// ```
pub struct ViperStream;

impl ViperStream {
    /// Registry over any device backend with the default configuration.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Registry {
        Registry::new(backend)
    }

    /// Registry over a device backend with a validated configuration.
    pub fn with_config(backend: Arc<dyn Backend>, config: AcquisitionConfig) -> Result<Registry> {
        config.validate()?;
        Ok(Registry::with_config(backend, config))
    }

    /// Registry holding a single emulated basestation.
    pub fn emulated(serial: u32, config: EmulatorConfig) -> Result<Registry> {
        // Fail early on an invalid emulator shape rather than at create()
        transport::EmulatedBasestation::new(transport::BasestationId::usb(serial), config)?;
        let backend = EmulatorBackend::new().with_device(serial, config);
        Ok(Registry::new(Arc::new(backend)))
    }

    /// Open a capture file for replay of one probe.
    pub fn open<P: AsRef<Path>>(path: P, probe: u8) -> Result<FileSource> {
        FileSource::open(path, probe, AcquisitionConfig::default().file_chunk_bytes)
    }
}
