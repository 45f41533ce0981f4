//! Incremental frame scanner with byte-level resynchronisation
//!
//! The scanner owns a growing byte buffer fed from a transport or a file and
//! yields one [`ScanEvent`] at a time. Corrupt frames are reported once; the
//! scanner then hunts byte by byte for the next magic marker without
//! reporting the skipped bytes again.

use super::format::{DecodeError, MAGIC, classify_tail, decode_prefix};
use crate::types::Frame;

const MAGIC_BYTES: [u8; 4] = MAGIC.to_le_bytes();

/// Outcome of one scanning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A frame passed magic and CRC validation.
    Frame { frame: Frame, wire_len: usize },
    /// A frame start failed validation; the scanner is now hunting.
    Fault(DecodeError),
}

/// Stateful frame extractor over an arbitrary byte stream.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: Vec<u8>,
    pos: usize,
    hunting: bool,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True while searching for the next magic marker after a fault.
    pub fn is_hunting(&self) -> bool {
        self.hunting
    }

    /// Next event, or `None` when more input is needed.
    pub fn next_event(&mut self) -> Option<ScanEvent> {
        self.step(false)
    }

    /// Next event once the input is known to be complete.
    ///
    /// A frame that cannot complete is skipped one byte at a time, so frames
    /// hidden behind a bogus length still surface. It is reported as a fault
    /// when its length field is evidently damaged; a plain truncated tail is
    /// dropped silently. Returns `None` once the buffer is exhausted.
    pub fn next_event_at_eof(&mut self) -> Option<ScanEvent> {
        self.step(true)
    }

    /// Discard whatever is left in the buffer, returning the byte count.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffered();
        self.buf.clear();
        self.pos = 0;
        self.hunting = false;
        discarded
    }

    fn step(&mut self, eof: bool) -> Option<ScanEvent> {
        loop {
            if self.hunting {
                match find_magic(&self.buf[self.pos..]) {
                    Some(offset) => {
                        self.pos += offset;
                        self.hunting = false;
                    }
                    None => {
                        // Keep a possible partial marker at the tail
                        let keep = if eof { 0 } else { MAGIC_BYTES.len() - 1 };
                        self.pos = self.pos.max(self.buf.len().saturating_sub(keep));
                        return None;
                    }
                }
            }

            match decode_prefix(&self.buf[self.pos..]) {
                Ok((frame, wire_len)) => {
                    self.pos += wire_len;
                    return Some(ScanEvent::Frame { frame, wire_len });
                }
                Err(DecodeError::Truncated { .. }) => {
                    if !eof || self.buffered() == 0 {
                        return None;
                    }
                    let fault = classify_tail(&self.buf[self.pos..]);
                    self.pos += 1;
                    self.hunting = true;
                    if let Some(error) = fault {
                        return Some(ScanEvent::Fault(error));
                    }
                }
                Err(error) => {
                    self.pos += 1;
                    self.hunting = true;
                    return Some(ScanEvent::Fault(error));
                }
            }
        }
    }
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack.windows(MAGIC_BYTES.len()).position(|w| w == MAGIC_BYTES)
}
