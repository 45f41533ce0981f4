//! Live source mirrored into a capture file

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{LiveSource, PacketBatch, ReadRequest, ReadStatus};
use crate::codec::encode_into;
use crate::types::Frame;
use crate::{AcquisitionError, Result};

/// Append-only writer of wire frames.
#[derive(Debug)]
pub struct CaptureWriter {
    path: PathBuf,
    out: BufWriter<File>,
    scratch: Vec<u8>,
    frames_written: u64,
}

impl CaptureWriter {
    /// Open `path` for appending, creating it if needed. Existing data is kept.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| AcquisitionError::file_error(path.clone(), e))?;
        info!(path = %path.display(), "Capture file opened");
        Ok(Self { path, out: BufWriter::new(file), scratch: Vec::new(), frames_written: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append the exact wire bytes of `frame`.
    pub fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.scratch.clear();
        encode_into(frame, &mut self.scratch);
        self.out.write_all(&self.scratch)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        if let Err(error) = self.out.flush() {
            warn!(path = %self.path.display(), %error, "Failed to flush capture file");
        }
    }
}

/// Live source that also records every frame it decodes.
#[derive(Debug)]
pub struct TeeSource {
    live: LiveSource,
    writer: CaptureWriter,
}

impl TeeSource {
    pub fn new(live: LiveSource, writer: CaptureWriter) -> Self {
        Self { live, writer }
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    pub fn into_live(self) -> LiveSource {
        self.live
    }

    /// Read like the live source, appending every cleanly framed frame of all
    /// probes. Stale-session frames are captured too, so a replay sees what
    /// the live diagnostics saw.
    ///
    /// A write failure does not fail the read: the batch carries
    /// [`ReadStatus::CaptureFailed`] and the caller is expected to stop teeing.
    pub async fn read(&mut self, request: ReadRequest) -> Result<PacketBatch> {
        let writer = &mut self.writer;
        let mut failure: Option<std::io::Error> = None;

        let mut batch = self
            .live
            .read_with(request, |frame| {
                if failure.is_none() {
                    if let Err(error) = writer.write_frame(frame) {
                        failure = Some(error);
                    }
                }
            })
            .await?;

        if failure.is_none() {
            if let Err(error) = writer.flush() {
                failure = Some(error);
            }
        }

        if let Some(error) = failure {
            warn!(path = %writer.path().display(), %error, "Capture write failed, capture suspended");
            batch.status = ReadStatus::CaptureFailed { path: writer.path().to_path_buf(), reason: error.to_string() };
        }
        Ok(batch)
    }
}
