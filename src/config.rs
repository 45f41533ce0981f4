//! Acquisition tuning parameters

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{AcquisitionError, Result};

/// Buffer sizes and timeouts shared by every device and stream handle.
///
/// Missing YAML keys fall back to their defaults:
///
/// ```rust
/// use viperstream::AcquisitionConfig;
///
/// let config = AcquisitionConfig::from_yaml_str("read_timeout_ms: 250").unwrap();
/// assert_eq!(config.read_timeout_ms, 250);
/// assert_eq!(config.probe_queue_capacity, 8192);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// How long a live read waits for data before returning empty
    pub read_timeout_ms: u64,
    /// Largest transfer requested from the transport per receive
    pub receive_chunk_bytes: usize,
    /// Read size used when replaying capture files
    pub file_chunk_bytes: usize,
    /// Packets held per probe before the oldest is dropped
    pub probe_queue_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 100,
            receive_chunk_bytes: 64 * 1024,
            file_chunk_bytes: 64 * 1024,
            probe_queue_capacity: 8192,
        }
    }
}

impl AcquisitionConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| AcquisitionError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("receive_chunk_bytes", self.receive_chunk_bytes),
            ("file_chunk_bytes", self.file_chunk_bytes),
            ("probe_queue_capacity", self.probe_queue_capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(AcquisitionError::config_error(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
