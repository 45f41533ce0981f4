//! Capture file replay
//!
//! A capture file is a raw concatenation of wire frames for every probe. The
//! reader replays the frames of one probe through a scanner of its own, so a
//! damaged capture resynchronises exactly like a live stream would.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

use super::{PacketBatch, ReadRequest, ReadStatus, drain_queue};
use crate::codec::{FrameScanner, MAX_PROBES, ScanEvent};
use crate::diagnostics::{Diagnostics, SessionPolicy};
use crate::types::{DiagStats, Frame, PacketInfo};
use crate::{AcquisitionError, Result};

/// Sequential reader over a capture file for one probe.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    probe: u8,
    scanner: FrameScanner,
    diagnostics: Diagnostics,
    pending: VecDeque<Frame>,
    chunk: Vec<u8>,
    file_exhausted: bool,
}

impl FileSource {
    /// Open a capture file, replaying frames of `probe`.
    pub fn open<P: AsRef<Path>>(path: P, probe: u8, chunk_bytes: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if probe >= MAX_PROBES {
            return Err(AcquisitionError::ProbeOutOfRange { probe });
        }
        if chunk_bytes == 0 {
            return Err(AcquisitionError::parameter_invalid("chunk_bytes", "must be greater than zero"));
        }

        let file = File::open(&path).map_err(|e| AcquisitionError::file_error(path.clone(), e))?;
        info!(path = %path.display(), probe, "Opened capture file");

        Ok(Self {
            path,
            file,
            probe,
            scanner: FrameScanner::new(),
            diagnostics: Diagnostics::new(SessionPolicy::Follow),
            pending: VecDeque::new(),
            chunk: vec![0; chunk_bytes],
            file_exhausted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn probe(&self) -> u8 {
        self.probe
    }

    /// Counters accumulated over everything replayed so far.
    pub fn diag_stats(&self) -> DiagStats {
        self.diagnostics.snapshot()
    }

    /// Number of session changes seen in the file.
    pub fn session_boundaries(&self) -> u32 {
        self.diagnostics.session_boundaries()
    }

    /// True once every frame in the file has been returned.
    pub fn is_exhausted(&self) -> bool {
        self.file_exhausted && self.scanner.buffered() == 0 && self.pending.is_empty()
    }

    /// Read up to `request.max_packets` packets.
    ///
    /// The batch is marked [`ReadStatus::EndOfStream`] once the file holds no
    /// further complete frame; packets read in the same call are still returned.
    pub fn read(&mut self, request: ReadRequest) -> Result<PacketBatch> {
        request.validate()?;
        if request.probe != self.probe {
            return Err(AcquisitionError::parameter_invalid(
                "probe",
                format!("stream was opened for probe {}, not {}", self.probe, request.probe),
            ));
        }

        while self.pending.len() < request.max_packets && !self.is_exhausted() {
            if !self.fill()? {
                break;
            }
        }

        let mut batch = drain_queue(&mut self.pending, &request)?;
        if self.is_exhausted() {
            debug!(path = %self.path.display(), "End of capture file");
            batch.status = ReadStatus::EndOfStream;
        }
        Ok(batch)
    }

    /// Read into caller buffers, returning the packet count and status.
    pub fn read_into(
        &mut self,
        infos: &mut [PacketInfo],
        samples: &mut [i16],
        channel_count: usize,
    ) -> Result<(usize, ReadStatus)> {
        super::check_buffers(infos.len(), samples.len(), channel_count)?;
        let batch = self.read(ReadRequest::new(self.probe, channel_count, infos.len()))?;
        let count = batch.copy_into(infos, samples)?;
        Ok((count, batch.status))
    }

    /// Advance the scanner by one event, reading more of the file when it
    /// runs dry. Returns false once nothing more can be produced.
    fn fill(&mut self) -> Result<bool> {
        let event = if self.file_exhausted {
            self.scanner.next_event_at_eof()
        } else {
            self.scanner.next_event()
        };

        match event {
            Some(ScanEvent::Frame { frame, wire_len }) => {
                let accepted = self.diagnostics.observe_frame(&frame, wire_len).is_accepted();
                if accepted && frame.probe == self.probe {
                    self.pending.push_back(frame);
                }
                Ok(true)
            }
            Some(ScanEvent::Fault(error)) => {
                trace!(%error, "Framing fault in capture file");
                if let Some(kind) = error.kind() {
                    self.diagnostics.observe_fault(kind);
                }
                Ok(true)
            }
            None if self.file_exhausted => {
                self.scanner.finish();
                Ok(false)
            }
            None => {
                let read = self
                    .file
                    .read(&mut self.chunk)
                    .map_err(|e| AcquisitionError::file_error(self.path.clone(), e))?;
                if read == 0 {
                    self.file_exhausted = true;
                } else {
                    self.scanner.extend(&self.chunk[..read]);
                }
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FrameBuilder, encode_frames, write_capture};

    fn frames(probe: u8, session: u8, range: std::ops::Range<u16>) -> Vec<Frame> {
        range.map(|s| FrameBuilder::new().sequence(s).session(session).probe(probe).samples(&[s as i16; 8]).build()).collect()
    }

    #[test]
    fn replays_every_frame_then_reports_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(dir.path(), "clean.bin", &encode_frames(&frames(0, 0, 0..5)));

        let mut source = FileSource::open(&path, 0, 32).unwrap();
        let first = source.read(ReadRequest::new(0, 8, 3)).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first.status, ReadStatus::Ok);

        let second = source.read(ReadRequest::new(0, 8, 10)).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second.status, ReadStatus::EndOfStream);

        let third = source.read(ReadRequest::new(0, 8, 10)).unwrap();
        assert!(third.is_empty());
        assert!(third.is_end_of_stream());
    }

    #[test]
    fn skips_other_probes() {
        let mut all = frames(0, 0, 0..2);
        all.extend(frames(2, 0, 2..4));
        all.extend(frames(0, 0, 4..5));
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(dir.path(), "mixed.bin", &encode_frames(&all));

        let mut source = FileSource::open(&path, 0, 4096).unwrap();
        let batch = source.read(ReadRequest::new(0, 8, 10)).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.is_end_of_stream());
        assert_eq!(source.diag_stats().err_count, 0);
    }

    #[test]
    fn truncated_tail_ends_stream_without_error() {
        let mut bytes = encode_frames(&frames(0, 0, 0..3));
        bytes.truncate(bytes.len() - 7);
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(dir.path(), "cut.bin", &bytes);

        let mut source = FileSource::open(&path, 0, 16).unwrap();
        let batch = source.read(ReadRequest::new(0, 8, 10)).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.is_end_of_stream());
        assert_eq!(source.diag_stats().error_total(), 0);
    }

    #[test]
    fn session_changes_are_boundaries() {
        let mut all = frames(0, 4, 0..2);
        all.extend(frames(0, 5, 0..2));
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(dir.path(), "sessions.bin", &encode_frames(&all));

        let mut source = FileSource::open(&path, 0, 4096).unwrap();
        let batch = source.read(ReadRequest::new(0, 8, 10)).unwrap();
        assert_eq!(batch.infos.iter().map(|i| i.session_id).collect::<Vec<_>>(), vec![4, 4, 5, 5]);
        assert_eq!(source.session_boundaries(), 1);
        assert_eq!(source.diag_stats().session_mismatch, 0);
    }

    #[test]
    fn wrong_probe_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(dir.path(), "one.bin", &encode_frames(&frames(1, 0, 0..1)));

        let mut source = FileSource::open(&path, 1, 4096).unwrap();
        assert!(matches!(
            source.read(ReadRequest::new(0, 8, 1)),
            Err(AcquisitionError::ParameterInvalid { .. })
        ));

        let missing = FileSource::open(dir.path().join("absent.bin"), 0, 4096);
        assert!(matches!(missing, Err(AcquisitionError::File { .. })));
    }

    #[test]
    fn read_into_validates_buffer_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(dir.path(), "into.bin", &encode_frames(&frames(0, 0, 0..2)));
        let mut source = FileSource::open(&path, 0, 4096).unwrap();

        let mut infos = [PacketInfo::default(); 2];
        let mut samples = [0i16; 15];
        assert!(source.read_into(&mut infos, &mut samples, 8).is_err());

        let mut samples = [0i16; 16];
        let (count, status) = source.read_into(&mut infos, &mut samples, 8).unwrap();
        assert_eq!(count, 2);
        assert_eq!(status, ReadStatus::EndOfStream);
        assert_eq!(samples[8..], [1; 8]);
    }
}
