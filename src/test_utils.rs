//! Test utilities for building frames and capture files
//!
//! Shared by unit tests and the benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::path::{Path, PathBuf};

use crate::codec::{encode_into, frame_len, pack_samples};
use crate::types::{Frame, StatusFlags};

/// Builder for frames with sensible defaults: sequence 0, session 0, probe 0,
/// one zero sample.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    sequence: u16,
    timestamp: u32,
    status: u16,
    session: u8,
    probe: u8,
    samples: Vec<i16>,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self { sequence: 0, timestamp: 0, status: 0, session: 0, probe: 0, samples: vec![0] }
    }
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Raw status bits, see [`StatusFlags`] constants.
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn session(mut self, session: u8) -> Self {
        self.session = session;
        self
    }

    pub fn probe(mut self, probe: u8) -> Self {
        self.probe = probe;
        self
    }

    /// 12-bit samples; values outside -2048..=2047 are truncated.
    pub fn samples(mut self, samples: &[i16]) -> Self {
        self.samples = samples.to_vec();
        self
    }

    pub fn build(self) -> Frame {
        Frame::new(
            self.sequence,
            self.timestamp,
            StatusFlags::new(self.status),
            self.session,
            self.probe,
            pack_samples(&self.samples),
        )
    }
}

/// Concatenated wire encoding of `frames`.
pub fn encode_frames(frames: &[Frame]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames.iter().map(|f| frame_len(f.channel_count())).sum());
    for frame in frames {
        encode_into(frame, &mut out);
    }
    out
}

/// Wire bytes of a contiguous recording: `ticks` ticks of one frame per
/// probe, with a ramp pattern in every channel.
pub fn synthetic_stream(ticks: u32, probes: u8, channels: usize, session: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(ticks as usize * probes as usize * frame_len(channels));
    let mut sequence = 0u16;
    let mut samples = vec![0i16; channels];

    for tick in 0..ticks {
        for (channel, sample) in samples.iter_mut().enumerate() {
            *sample = ((tick as usize + channel) % 4096) as i16 - 2048;
        }
        let payload = pack_samples(&samples);
        for probe in 0..probes {
            let frame = Frame::new(sequence, tick, StatusFlags::default(), session, probe, payload.clone());
            encode_into(&frame, &mut out);
            sequence = sequence.wrapping_add(1);
        }
    }
    out
}

/// Write `bytes` to `dir/name` and return the path.
pub fn write_capture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Err(error) = std::fs::write(&path, bytes) {
        panic!("Failed to write capture fixture {}: {error}", path.display());
    }
    path
}
