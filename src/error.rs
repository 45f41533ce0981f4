//! Error types for acquisition operations.
//!
//! All fallible calls return [`Result`], so every outcome is an explicit value.
//! There is no process-wide "last error" slot: the error itself carries the
//! context, and [`AcquisitionError::error_code`] maps it onto the numeric
//! codes used by the basestation tooling.
//!
//! ## Error Categories
//!
//! - **Lifecycle Errors**: invalid or destroyed handles, devices not found
//! - **Caller Contract Errors**: out-of-range parameters, channel count mismatch,
//!   undersized buffers
//! - **File Errors**: capture and replay files that cannot be opened or read
//! - **Transport Errors**: failures reported by the USB/platform collaborator
//!
//! Framing errors (bad magic, bad CRC) and continuity anomalies never surface
//! here. They are counted by [`crate::diagnostics::Diagnostics`] and the stream continues.
//!
//! ```rust
//! use viperstream::{AcquisitionError, ErrorCode, HandleKind};
//!
//! let error = AcquisitionError::invalid_handle(HandleKind::Device);
//! assert_eq!(error.error_code(), ErrorCode::InvalidDeviceHandle);
//! assert!(!error.is_retryable());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for acquisition operations.
pub type Result<T, E = AcquisitionError> = std::result::Result<T, E>;

/// Which kind of opaque handle failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Device,
    Stream,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::Device => f.write_str("device"),
            HandleKind::Stream => f.write_str("stream"),
        }
    }
}

/// Main error type for acquisition operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AcquisitionError {
    #[error("Invalid {kind} handle")]
    InvalidHandle { kind: HandleKind },

    #[error("Basestation not found{}", describe_serial(.serial))]
    DeviceNotFound { serial: Option<u32> },

    /// The previous handle to this basestation is still being closed.
    #[error("Basestation {serial} is still closing")]
    DeviceBusy { serial: u32 },

    #[error("Invalid parameter '{parameter}': {details}")]
    ParameterInvalid { parameter: String, details: String },

    #[error("Probe index {probe} is out of range")]
    ProbeOutOfRange { probe: u8 },

    #[error("Stream file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream I/O error during {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("{feature} is not supported by this transport")]
    NotSupported { feature: String },
}

fn describe_serial(serial: &Option<u32>) -> String {
    serial.map(|s| format!(" (serial {s})")).unwrap_or_default()
}

impl AcquisitionError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquisitionError::Transport { .. } => true,
            AcquisitionError::Timeout { .. } => true,
            AcquisitionError::Io { .. } => true,
            AcquisitionError::DeviceNotFound { .. } => true,
            AcquisitionError::DeviceBusy { .. } => true,
            AcquisitionError::InvalidHandle { .. } => false,
            AcquisitionError::ParameterInvalid { .. } => false,
            AcquisitionError::ProbeOutOfRange { .. } => false,
            AcquisitionError::File { .. } => false,
            AcquisitionError::Config { .. } => false,
            AcquisitionError::NotSupported { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AcquisitionError::InvalidHandle { .. } => vec![
                "Create a new handle; destroyed handles are never reused",
                "Check the handle was not closed by another thread",
            ],
            AcquisitionError::DeviceNotFound { .. } => vec![
                "Check the basestation is powered and connected",
                "Rescan for devices before creating a handle",
                "Verify the serial number",
            ],
            AcquisitionError::DeviceBusy { .. } => vec![
                "Wait for the destroy call on the old handle to finish",
                "Retry creating the handle",
            ],
            AcquisitionError::ParameterInvalid { .. } => vec![
                "Check the channel count matches the recorded stream",
                "Ensure output buffers hold packets x channels samples",
                "Verify the value is within the documented range",
            ],
            AcquisitionError::ProbeOutOfRange { .. } => {
                vec!["Use a probe index between 0 and 3", "Check the probe is connected"]
            }
            AcquisitionError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check directory permissions for capture files",
                "Ensure sufficient disk space",
            ],
            AcquisitionError::Io { .. } => vec![
                "Retry the read",
                "Check the storage device is still available",
            ],
            AcquisitionError::Transport { .. } => vec![
                "Check the USB cable and headstage connection",
                "Destroy and recreate the device handle",
            ],
            AcquisitionError::Timeout { .. } => vec![
                "Increase the read timeout",
                "Verify the device is armed and triggered",
            ],
            AcquisitionError::Config { .. } => vec![
                "Check configuration field names and value ranges",
                "Remove the field to fall back to its default",
            ],
            AcquisitionError::NotSupported { .. } => {
                vec!["Use a transport that implements this feature"]
            }
        }
    }

    /// Numeric status code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AcquisitionError::InvalidHandle { kind: HandleKind::Device } => {
                ErrorCode::InvalidDeviceHandle
            }
            AcquisitionError::InvalidHandle { kind: HandleKind::Stream } => ErrorCode::IllegalHandle,
            AcquisitionError::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            AcquisitionError::DeviceBusy { .. } => ErrorCode::AlreadyOpen,
            AcquisitionError::ParameterInvalid { .. } => ErrorCode::ParameterInvalid,
            AcquisitionError::ProbeOutOfRange { .. } => ErrorCode::WrongDockId,
            AcquisitionError::File { .. } => ErrorCode::FileOpenError,
            AcquisitionError::Io { .. } => ErrorCode::FileIoErr,
            AcquisitionError::Transport { .. } => ErrorCode::IoError,
            AcquisitionError::Timeout { .. } => ErrorCode::Timeout,
            AcquisitionError::Config { .. } => ErrorCode::ParameterInvalid,
            AcquisitionError::NotSupported { .. } => ErrorCode::NotSupported,
        }
    }

    /// Helper constructor for invalid handles.
    pub fn invalid_handle(kind: HandleKind) -> Self {
        AcquisitionError::InvalidHandle { kind }
    }

    /// Helper constructor for caller contract violations.
    pub fn parameter_invalid(parameter: impl Into<String>, details: impl Into<String>) -> Self {
        AcquisitionError::ParameterInvalid { parameter: parameter.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        AcquisitionError::File { path, source }
    }

    /// Helper constructor for stream I/O errors.
    pub fn io_error(context: impl Into<String>, source: std::io::Error) -> Self {
        AcquisitionError::Io { context: context.into(), source }
    }

    /// Helper constructor for transport failures.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        AcquisitionError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        AcquisitionError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(details: impl Into<String>) -> Self {
        AcquisitionError::Config { details: details.into() }
    }
}

impl From<std::io::Error> for AcquisitionError {
    fn from(err: std::io::Error) -> Self {
        AcquisitionError::Io { context: "<unknown>".to_string(), source: err }
    }
}

impl From<serde_yaml_ng::Error> for AcquisitionError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        AcquisitionError::Config { details: err.to_string() }
    }
}

/// Numeric status codes shared with the basestation C interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    Failed = 1,
    AlreadyOpen = 2,
    NotOpen = 3,
    ParameterInvalid = 6,
    Timeout = 8,
    FileOpenError = 15,
    FileIoErr = 17,
    NoLock = 19,
    IoError = 22,
    StreamEof = 26,
    HdrerrMagic = 27,
    HdrerrCrc = 28,
    WrongDockId = 31,
    DeviceNotFound = 41,
    InvalidDeviceHandle = 42,
    IllegalHandle = 43,
    NotSupported = 0xFE,
    NotImplemented = 0xFF,
}

impl ErrorCode {
    /// Raw numeric value.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable description of the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "The function returned successfully",
            ErrorCode::Failed => "Unspecified failure",
            ErrorCode::AlreadyOpen => "A board was already open",
            ErrorCode::NotOpen => "The board or port is not open",
            ErrorCode::ParameterInvalid => "A parameter had an illegal value or out of range",
            ErrorCode::Timeout => "The function did not complete within a restricted period of time",
            ErrorCode::FileOpenError => "The file could not be opened",
            ErrorCode::FileIoErr => "A file IO operation failed",
            ErrorCode::NoLock => "Missing serializer clock",
            ErrorCode::IoError => "A data stream IO error occurred",
            ErrorCode::StreamEof => "The stream is at the end of the file",
            ErrorCode::HdrerrMagic => "The packet header is corrupt and cannot be decoded",
            ErrorCode::HdrerrCrc => "The packet header's crc is invalid",
            ErrorCode::WrongDockId => "The specified probe id is out of bound",
            ErrorCode::DeviceNotFound => "Basestation with given serial number not found",
            ErrorCode::InvalidDeviceHandle => "Invalid device handle",
            ErrorCode::IllegalHandle => "The value of the 'handle' parameter is not valid",
            ErrorCode::NotSupported => "The function is not supported",
            ErrorCode::NotImplemented => "The function is not implemented",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}
