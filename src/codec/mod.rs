//! Packet codec for the basestation wire format
//!
//! [`format`] holds the frame layout with stateless `decode`/`encode`, and
//! [`scanner`] turns an arbitrary byte stream into frames and faults.
//!
//! ```rust
//! use viperstream::codec::{FrameScanner, ScanEvent, decode, encode};
//! use viperstream::types::{Frame, StatusFlags};
//!
//! let frame = Frame::new(1, 100, StatusFlags::default(), 0, 0, vec![0x05, 0x00]);
//! let bytes = encode(&frame);
//! assert_eq!(decode(&bytes).unwrap(), frame);
//!
//! let mut scanner = FrameScanner::new();
//! scanner.extend(&bytes);
//! assert!(matches!(scanner.next_event(), Some(ScanEvent::Frame { .. })));
//! ```

pub mod format;
pub mod scanner;

pub use format::{
    CRC_LEN, DecodeError, FaultKind, HEADER_LEN, MAGIC, MAX_CHANNELS, MAX_PROBES, classify_tail,
    decode, decode_prefix, encode, encode_into, frame_len, pack_samples, unpack_samples,
};
pub use scanner::{FrameScanner, ScanEvent};
