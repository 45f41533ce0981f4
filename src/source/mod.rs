//! Packet sources behind one read interface
//!
//! A [`StreamSource`] is either the live transport, a capture file being
//! replayed, or the live transport teed into a capture file. All three answer
//! a [`ReadRequest`] with a [`PacketBatch`].
//!
//! ## Architecture
//!
//! ```text
//! Transport ──► LiveSource ──► PacketBatch
//!                  │
//!                  └─(TeeSource)──► capture file ──► FileSource ──► PacketBatch
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::codec::{MAX_CHANNELS, MAX_PROBES, unpack_samples};
use crate::types::{Frame, PacketInfo};
use crate::{AcquisitionError, Result};

mod file;
mod live;
mod tee;

pub use file::FileSource;
pub use live::LiveSource;
pub use tee::{CaptureWriter, TeeSource};

/// Parameters of one read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub probe: u8,
    /// Channels the caller expects in every packet
    pub channel_count: usize,
    /// Upper bound on packets returned
    pub max_packets: usize,
}

impl ReadRequest {
    pub fn new(probe: u8, channel_count: usize, max_packets: usize) -> Self {
        Self { probe, channel_count, max_packets }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.probe >= MAX_PROBES {
            return Err(AcquisitionError::ProbeOutOfRange { probe: self.probe });
        }
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(AcquisitionError::parameter_invalid(
                "channel_count",
                format!("{} is outside 1..={MAX_CHANNELS}", self.channel_count),
            ));
        }
        Ok(())
    }
}

/// Outcome attached to a batch, independent of how many packets it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStatus {
    Ok,
    /// No further packets will ever be produced
    EndOfStream,
    /// Capture stopped after a write error; the packets are still valid
    CaptureFailed { path: PathBuf, reason: String },
}

/// Packets returned by one read, samples stored packet-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBatch {
    pub infos: Vec<PacketInfo>,
    pub samples: Vec<i16>,
    pub channel_count: usize,
    pub status: ReadStatus,
}

impl PacketBatch {
    pub fn empty(channel_count: usize) -> Self {
        Self { infos: Vec::new(), samples: Vec::new(), channel_count, status: ReadStatus::Ok }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Metadata and samples of packet `index`.
    pub fn packet(&self, index: usize) -> Option<(&PacketInfo, &[i16])> {
        let info = self.infos.get(index)?;
        let start = index * self.channel_count;
        Some((info, &self.samples[start..start + self.channel_count]))
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.status == ReadStatus::EndOfStream
    }

    /// Copy into caller-owned buffers, returning the packet count.
    pub fn copy_into(&self, infos: &mut [PacketInfo], samples: &mut [i16]) -> Result<usize> {
        check_buffers(infos.len(), samples.len(), self.channel_count)?;
        let count = self.len().min(infos.len());
        infos[..count].copy_from_slice(&self.infos[..count]);
        let sample_count = count * self.channel_count;
        samples[..sample_count].copy_from_slice(&self.samples[..sample_count]);
        Ok(count)
    }
}

/// Reject caller buffers that cannot hold `packets` packets of `channels` samples.
pub fn check_buffers(packets: usize, samples: usize, channels: usize) -> Result<()> {
    let needed = packets.saturating_mul(channels);
    if samples < needed {
        return Err(AcquisitionError::parameter_invalid(
            "samples",
            format!("buffer holds {samples} samples, {packets} packets of {channels} channels need {needed}"),
        ));
    }
    Ok(())
}

/// Move up to `max_packets` queued frames into a batch.
///
/// Stops at the first frame whose channel count differs from the request.
/// When that is the very first frame the read fails and nothing is consumed.
pub(crate) fn drain_queue(queue: &mut VecDeque<Frame>, request: &ReadRequest) -> Result<PacketBatch> {
    let channels = request.channel_count;
    let mut batch = PacketBatch::empty(channels);

    while batch.len() < request.max_packets {
        let Some(frame) = queue.front() else {
            break;
        };
        if frame.channel_count() != channels {
            if batch.is_empty() {
                return Err(AcquisitionError::parameter_invalid(
                    "channel_count",
                    format!("packet carries {} channels, caller expects {channels}", frame.channel_count()),
                ));
            }
            break;
        }

        let start = batch.samples.len();
        batch.samples.resize(start + channels, 0);
        unpack_samples(&frame.payload, channels, &mut batch.samples[start..])?;
        batch.infos.push(frame.info());
        queue.pop_front();
    }

    Ok(batch)
}

/// Any of the three packet sources.
#[derive(Debug)]
pub enum StreamSource {
    Live(LiveSource),
    File(FileSource),
    Tee(TeeSource),
}

impl StreamSource {
    /// Replay a capture file for one probe.
    pub fn open_file<P: AsRef<Path>>(path: P, probe: u8, chunk_bytes: usize) -> Result<Self> {
        Ok(StreamSource::File(FileSource::open(path, probe, chunk_bytes)?))
    }

    pub async fn read(&mut self, request: ReadRequest) -> Result<PacketBatch> {
        match self {
            StreamSource::Live(live) => live.read(request).await,
            StreamSource::File(file) => file.read(request),
            StreamSource::Tee(tee) => tee.read(request).await,
        }
    }

    /// Start teeing a live source into `writer`. Other sources are unchanged.
    pub fn with_capture(self, writer: CaptureWriter) -> Self {
        match self {
            StreamSource::Live(live) => StreamSource::Tee(TeeSource::new(live, writer)),
            StreamSource::Tee(tee) => StreamSource::Tee(TeeSource::new(tee.into_live(), writer)),
            file => file,
        }
    }

    /// Stop teeing, keeping the live source.
    pub fn without_capture(self) -> Self {
        match self {
            StreamSource::Tee(tee) => StreamSource::Live(tee.into_live()),
            other => other,
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, StreamSource::Tee(_))
    }

    pub fn capture_path(&self) -> Option<&Path> {
        match self {
            StreamSource::Tee(tee) => Some(tee.path()),
            _ => None,
        }
    }
}
