//! Core types for neural sample stream representation.
//!
//! ## Architecture
//!
//! - [`Frame`] is one decoded wire frame with its raw payload (zero-copy via Arc)
//! - [`PacketInfo`] is the per-packet metadata handed to callers
//! - [`StatusFlags`] decodes the header status word (trigger, link errors, TTL lines)
//! - [`DiagStats`] is a snapshot of the per-handle diagnostic counters
//! - [`SyncSettings`] groups the sync clock, sync mode and trigger mode
//!
//! ## Usage Example
//!
//! ```rust
//! use viperstream::types::{Frame, StatusFlags};
//!
//! let frame = Frame::new(
//!     41,                               // sequence
//!     30_000,                           // timestamp
//!     StatusFlags::new(StatusFlags::TRIGGER),
//!     2,                                // session id
//!     0,                                // probe
//!     vec![0x01, 0x00, 0xFF, 0x0F],     // two channels
//! );
//!
//! let info = frame.info();
//! assert_eq!(info.payload_length, 2);
//! assert!(info.status.is_trigger());
//! ```

mod diag;
mod frame;
mod status;
mod sync;

pub use diag::DiagStats;
pub use frame::{Frame, PacketInfo};
pub use status::{StatusFlags, sequence_after};
pub use sync::{MAX_SYNC_PERIOD_MS, MIN_SYNC_PERIOD_MS, SyncClock, SyncMode, SyncSettings, TriggerMode};
