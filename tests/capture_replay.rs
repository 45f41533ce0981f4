//! Capture file replay through the public API
//!
//! Builds capture files from encoded frames and replays them through
//! [`FileSource`], checking delivered packets and the diagnostics gathered on
//! the way: session boundaries, corruption, truncated tails and probe
//! filtering.

use anyhow::{Context, Result, ensure};
use std::path::PathBuf;
use viperstream::codec::{self, frame_len};
use viperstream::{AcquisitionError, FileSource, Frame, PacketInfo, ReadRequest, ReadStatus, StatusFlags, ViperStream};

const CHANNELS: usize = 8;

fn frame(sequence: u16, session: u8, probe: u8) -> Frame {
    let samples: Vec<i16> = (0..CHANNELS as i16).map(|c| c * 10 + sequence as i16).collect();
    Frame::new(
        sequence,
        1_000 + sequence as u32,
        StatusFlags::new(0),
        session,
        probe,
        codec::pack_samples(&samples),
    )
}

fn encode_all(frames: &[Frame]) -> Vec<u8> {
    frames.iter().flat_map(codec::encode).collect()
}

fn write_capture(dir: &tempfile::TempDir, bytes: &[u8]) -> Result<PathBuf> {
    let _ = tracing_subscriber::fmt::try_init();
    let path = dir.path().join("capture.bin");
    std::fs::write(&path, bytes).context("Failed to write capture file")?;
    Ok(path)
}

/// Read everything the source will deliver, in batches of `max_packets`.
fn replay_all(source: &mut FileSource, max_packets: usize) -> Result<Vec<PacketInfo>> {
    let mut infos = Vec::new();
    for _ in 0..10_000 {
        let batch = source.read(ReadRequest::new(source.probe(), CHANNELS, max_packets))?;
        infos.extend_from_slice(&batch.infos);
        if batch.is_end_of_stream() {
            return Ok(infos);
        }
    }
    anyhow::bail!("Replay never reached end of stream")
}

#[test]
fn replay_follows_session_boundaries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut frames: Vec<Frame> = (0..5).map(|s| frame(s, 1, 0)).collect();
    frames.extend((0..3).map(|s| frame(s, 2, 0)));
    let path = write_capture(&dir, &encode_all(&frames))?;

    let mut source = ViperStream::open(&path, 0)?;
    let infos = replay_all(&mut source, 3)?;

    ensure!(infos.len() == 8, "expected 8 packets, got {}", infos.len());
    ensure!(infos[4].session_id == 1 && infos[5].session_id == 2);
    ensure!(source.session_boundaries() == 1);

    let stats = source.diag_stats();
    ensure!(stats.error_total() == 0, "session change is not an error: {stats:?}");
    ensure!(stats.packet_count == 8);
    ensure!(stats.total_bytes == 8 * frame_len(CHANNELS) as u64);
    Ok(())
}

#[test]
fn corrupted_frame_is_counted_and_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let frames: Vec<Frame> = (0..6).map(|s| frame(s, 1, 0)).collect();
    let mut bytes = encode_all(&frames);

    // Flip a payload bit of the third frame
    let offset = 2 * frame_len(CHANNELS) + codec::HEADER_LEN + 1;
    bytes[offset] ^= 0x01;
    let path = write_capture(&dir, &bytes)?;

    let mut source = ViperStream::open(&path, 0)?;
    let infos = replay_all(&mut source, 16)?;
    let sequences: Vec<u16> = infos
        .iter()
        .map(|info| (info.timestamp - 1_000) as u16)
        .collect();
    ensure!(sequences == vec![0, 1, 3, 4, 5], "unexpected packets {sequences:?}");

    let stats = source.diag_stats();
    ensure!(stats.err_bad_crc == 1, "{stats:?}");
    ensure!(stats.err_bad_magic == 0, "{stats:?}");
    ensure!(stats.err_count == 1, "the lost frame leaves one sequence gap: {stats:?}");
    Ok(())
}

#[test]
fn damaged_length_in_the_last_frame_is_counted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let frames: Vec<Frame> = (0..3).map(|s| frame(s, 1, 0)).collect();
    let mut bytes = encode_all(&frames);

    // Length field of the last frame now claims 24 channels
    bytes[2 * frame_len(CHANNELS) + 14] ^= 0x10;
    let path = write_capture(&dir, &bytes)?;

    let mut source = ViperStream::open(&path, 0)?;
    let infos = replay_all(&mut source, 16)?;
    ensure!(infos.len() == 2, "expected 2 packets, got {}", infos.len());

    let stats = source.diag_stats();
    ensure!(stats.err_bad_crc == 1, "{stats:?}");
    ensure!(stats.error_total() == 1, "{stats:?}");
    Ok(())
}

#[test]
fn leading_garbage_and_truncated_tail() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let frames: Vec<Frame> = (0..3).map(|s| frame(s, 1, 0)).collect();

    let mut bytes = vec![0u8; 11];
    bytes.extend(encode_all(&frames));
    let tail = codec::encode(&frame(3, 1, 0));
    bytes.extend_from_slice(&tail[..10]);
    let path = write_capture(&dir, &bytes)?;

    let mut source = ViperStream::open(&path, 0)?;
    let infos = replay_all(&mut source, 16)?;
    ensure!(infos.len() == 3);
    ensure!(source.is_exhausted());

    let stats = source.diag_stats();
    ensure!(stats.err_bad_magic == 1, "garbage is reported once: {stats:?}");
    ensure!(stats.err_bad_crc == 0, "{stats:?}");
    Ok(())
}

#[test]
fn only_the_requested_probe_is_delivered() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut frames = Vec::new();
    let mut sequence = 0u16;
    for _tick in 0..4 {
        for probe in 0..3 {
            frames.push(frame(sequence, 7, probe));
            sequence += 1;
        }
    }
    let path = write_capture(&dir, &encode_all(&frames))?;

    let mut source = FileSource::open(&path, 1, 64)?;
    let infos = replay_all(&mut source, 2)?;
    ensure!(infos.len() == 4);

    // Diagnostics see every probe, so the interleaved sequence has no gaps
    let stats = source.diag_stats();
    ensure!(stats.packet_count == 12, "{stats:?}");
    ensure!(stats.err_count == 0, "{stats:?}");

    let err = source.read(ReadRequest::new(0, CHANNELS, 1)).unwrap_err();
    ensure!(matches!(err, AcquisitionError::ParameterInvalid { .. }), "{err}");
    Ok(())
}

#[test]
fn read_into_caller_buffers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let frames: Vec<Frame> = (0..5).map(|s| frame(s, 1, 0)).collect();
    let path = write_capture(&dir, &encode_all(&frames))?;
    let mut source = ViperStream::open(&path, 0)?;

    let mut infos = [PacketInfo::default(); 2];
    let mut samples = [0i16; 2 * CHANNELS];
    let mut total = 0;
    let mut last_status = ReadStatus::Ok;
    while last_status == ReadStatus::Ok {
        let (count, status) = source.read_into(&mut infos, &mut samples, CHANNELS)?;
        total += count;
        last_status = status;
        if count > 0 {
            let sequence = (infos[0].timestamp - 1_000) as i16;
            ensure!(samples[1] == 10 + sequence, "channel 1 of packet {sequence}");
        }
    }

    ensure!(total == 5);
    ensure!(last_status == ReadStatus::EndOfStream);
    Ok(())
}

#[test]
fn open_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let missing = ViperStream::open(dir.path().join("missing.bin"), 0).unwrap_err();
    ensure!(matches!(missing, AcquisitionError::File { .. }), "{missing}");

    let path = write_capture(&dir, &encode_all(&[frame(0, 1, 0)]))?;
    let probe = ViperStream::open(&path, 4).unwrap_err();
    ensure!(matches!(probe, AcquisitionError::ProbeOutOfRange { probe: 4 }), "{probe}");
    Ok(())
}

#[test]
fn empty_file_ends_immediately() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_capture(&dir, &[])?;

    let mut source = ViperStream::open(&path, 0)?;
    let batch = source.read(ReadRequest::new(0, CHANNELS, 10))?;
    ensure!(batch.is_empty());
    ensure!(batch.is_end_of_stream());
    ensure!(source.diag_stats().is_clear());
    Ok(())
}
