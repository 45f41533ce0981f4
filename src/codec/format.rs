//! Wire frame layout, decoding and encoding
//!
//! ## Frame Structure
//!
//! Every frame is a fixed 16-byte header, a payload of one 16-bit word per
//! channel and a 2-byte CRC trailer. All fields are little-endian:
//!
//! 1. **Magic** (4 bytes) - `"NVPK"`, the only field trusted before validation
//! 2. **Sequence** (2 bytes) - frame counter, wraps at 2^16
//! 3. **Timestamp** (4 bytes) - counter started by the trigger, reset at arm
//! 4. **Status** (2 bytes) - see [`StatusFlags`]
//! 5. **Session id** (1 byte) - recording epoch
//! 6. **Probe** (1 byte) - probe index 0..=3
//! 7. **Payload length** (2 bytes) - channel count
//! 8. **Payload** (2 x channels bytes) - 12-bit two's-complement samples
//! 9. **CRC** (2 bytes) - CRC-16/IBM-3740 over everything before it
//!
//! Capture files use the same layout: a raw concatenation of frames.

use crc::{CRC_16_IBM_3740, Crc};
use thiserror::Error;

use crate::types::{Frame, StatusFlags};
use crate::{AcquisitionError, Result};

/// Frame start marker as it appears on the wire.
pub const MAGIC: u32 = 0x4B50_564E;
/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 16;
/// Size of the CRC trailer in bytes.
pub const CRC_LEN: usize = 2;
/// Bytes per payload sample word.
pub const SAMPLE_BYTES: usize = 2;
/// Significant bits per sample.
pub const SAMPLE_BITS: u32 = 12;
/// Largest payload length accepted by the decoder.
pub const MAX_CHANNELS: usize = 1024;
/// Number of probes a basestation can stream.
pub const MAX_PROBES: u8 = 4;

const MAGIC_BYTES: [u8; 4] = MAGIC.to_le_bytes();
const SAMPLE_MASK: u16 = (1 << SAMPLE_BITS) - 1;
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

// Header field offsets
const OFFSET_SEQUENCE: usize = 4;
const OFFSET_TIMESTAMP: usize = 6;
const OFFSET_STATUS: usize = 10;
const OFFSET_SESSION: usize = 12;
const OFFSET_PROBE: usize = 13;
const OFFSET_LENGTH: usize = 14;

/// Total wire size of a frame carrying `channels` samples.
pub fn frame_len(channels: usize) -> usize {
    HEADER_LEN + channels * SAMPLE_BYTES + CRC_LEN
}

/// Framing fault classes counted by the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    BadMagic,
    BadCrc,
}

/// Reasons a byte range could not be decoded as a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame does not start with the magic marker. The CRC is still
    /// evaluated when the claimed frame fits in the input (`crc_ok`).
    #[error("Bad magic marker {found:#010x}")]
    BadMagic { found: u32, crc_ok: Option<bool> },

    #[error("Bad frame checksum: stored {stored:#06x}, computed {computed:#06x}")]
    BadCrc { stored: u16, computed: u16 },

    /// The payload length field is beyond anything the hardware produces.
    #[error("Payload length {length} exceeds {MAX_CHANNELS} channels")]
    Oversized { length: usize },

    #[error("Incomplete frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

impl DecodeError {
    /// Diagnostic class of this error; `None` means more input is needed.
    pub fn kind(&self) -> Option<FaultKind> {
        match self {
            DecodeError::BadMagic { .. } => Some(FaultKind::BadMagic),
            DecodeError::BadCrc { .. } | DecodeError::Oversized { .. } => Some(FaultKind::BadCrc),
            DecodeError::Truncated { .. } => None,
        }
    }
}

/// Decode the frame at the start of `bytes`. Trailing bytes are ignored.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    decode_prefix(bytes).map(|(frame, _)| frame)
}

/// Decode the frame at the start of `bytes`, returning it with its wire length.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Frame, usize), DecodeError> {
    if bytes.len() < MAGIC_BYTES.len() {
        return Err(DecodeError::Truncated { needed: HEADER_LEN, available: bytes.len() });
    }

    let magic_ok = bytes[..4] == MAGIC_BYTES;
    if !magic_ok {
        return Err(DecodeError::BadMagic { found: read_u32_le(bytes, 0), crc_ok: crc_matches(bytes) });
    }

    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated { needed: HEADER_LEN, available: bytes.len() });
    }

    let length = read_u16_le(bytes, OFFSET_LENGTH) as usize;
    if length > MAX_CHANNELS {
        return Err(DecodeError::Oversized { length });
    }

    let total = frame_len(length);
    if bytes.len() < total {
        return Err(DecodeError::Truncated { needed: total, available: bytes.len() });
    }

    let stored = read_u16_le(bytes, total - CRC_LEN);
    let computed = CRC16.checksum(&bytes[..total - CRC_LEN]);
    if stored != computed {
        return Err(DecodeError::BadCrc { stored, computed });
    }

    let frame = Frame::new(
        read_u16_le(bytes, OFFSET_SEQUENCE),
        read_u32_le(bytes, OFFSET_TIMESTAMP),
        StatusFlags::new(read_u16_le(bytes, OFFSET_STATUS)),
        bytes[OFFSET_SESSION],
        bytes[OFFSET_PROBE],
        bytes[HEADER_LEN..total - CRC_LEN].to_vec(),
    );

    Ok((frame, total))
}

/// Classify input that ends inside the frame it starts with.
///
/// A plain truncated tail gives `None`. When the payload length field is the
/// damage, the frame is reported as a checksum fault instead: either another
/// marker starts inside the claimed span, or the bytes present form a frame
/// whose CRC checks out once the length field agrees with their size.
pub fn classify_tail(bytes: &[u8]) -> Option<DecodeError> {
    if bytes.len() < HEADER_LEN + CRC_LEN || bytes[..4] != MAGIC_BYTES {
        return None;
    }
    let claimed = frame_len(read_u16_le(bytes, OFFSET_LENGTH) as usize);
    if bytes.len() >= claimed {
        return None;
    }

    let end = bytes.len() - CRC_LEN;
    let stored = read_u16_le(bytes, end);
    let computed = CRC16.checksum(&bytes[..end]);
    let fault = DecodeError::BadCrc { stored, computed };

    let marker_inside = bytes[1..].windows(MAGIC_BYTES.len()).any(|w| w == MAGIC_BYTES);
    if marker_inside {
        return Some(fault);
    }

    let payload = end - HEADER_LEN;
    if payload % SAMPLE_BYTES != 0 {
        return None;
    }
    let Ok(implied) = u16::try_from(payload / SAMPLE_BYTES) else {
        return None;
    };
    let mut digest = CRC16.digest();
    digest.update(&bytes[..OFFSET_LENGTH]);
    digest.update(&implied.to_le_bytes());
    digest.update(&bytes[HEADER_LEN..end]);
    (digest.finalize() == stored).then_some(fault)
}

/// Encode a frame into its wire representation.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame_len(frame.channel_count()));
    encode_into(frame, &mut out);
    out
}

/// Append the wire representation of `frame` to `out`.
///
/// The payload is written up to its last whole sample word. Frames carry at
/// most [`MAX_CHANNELS`] samples; anything larger is a caller bug.
pub fn encode_into(frame: &Frame, out: &mut Vec<u8>) {
    let channels = frame.channel_count();
    debug_assert!(channels <= MAX_CHANNELS, "{channels} channels exceed the {MAX_CHANNELS} channel limit");
    let start = out.len();

    out.extend_from_slice(&MAGIC_BYTES);
    out.extend_from_slice(&frame.sequence.to_le_bytes());
    out.extend_from_slice(&frame.timestamp.to_le_bytes());
    out.extend_from_slice(&frame.status.value().to_le_bytes());
    out.push(frame.session_id);
    out.push(frame.probe);
    out.extend_from_slice(&(channels as u16).to_le_bytes());
    out.extend_from_slice(&frame.payload[..channels * SAMPLE_BYTES]);

    let crc = CRC16.checksum(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
}

/// Unpack a payload into sign-extended samples.
///
/// Pure function of the payload bytes and channel count: the upper four bits
/// of each word are discarded and bit 11 is extended into `i16`.
pub fn unpack_samples(payload: &[u8], channels: usize, out: &mut [i16]) -> Result<()> {
    if payload.len() != channels * SAMPLE_BYTES {
        return Err(AcquisitionError::parameter_invalid(
            "channel_count",
            format!("payload holds {} channels, caller expects {}", payload.len() / 2, channels),
        ));
    }
    if out.len() < channels {
        return Err(AcquisitionError::parameter_invalid(
            "samples",
            format!("buffer holds {} samples, need {}", out.len(), channels),
        ));
    }

    for (slot, word) in out.iter_mut().zip(payload.chunks_exact(SAMPLE_BYTES)) {
        *slot = unpack_word(u16::from_le_bytes([word[0], word[1]]));
    }
    Ok(())
}

/// Pack samples into payload words; values are truncated to 12 bits.
pub fn pack_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|&s| ((s as u16) & SAMPLE_MASK).to_le_bytes()).collect()
}

fn unpack_word(word: u16) -> i16 {
    let shift = 16 - SAMPLE_BITS;
    ((word << shift) as i16) >> shift
}

/// CRC verdict for a frame whose header cannot be trusted, if it fits.
fn crc_matches(bytes: &[u8]) -> Option<bool> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let length = read_u16_le(bytes, OFFSET_LENGTH) as usize;
    let total = frame_len(length);
    if length > MAX_CHANNELS || bytes.len() < total {
        return None;
    }
    Some(read_u16_le(bytes, total - CRC_LEN) == CRC16.checksum(&bytes[..total - CRC_LEN]))
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
