//! Device handle lifecycle through the public API
//!
//! Exercises the registry the way an application would: opening emulated and
//! loopback basestations, recording, capturing to disk, replaying, and
//! tearing handles down while other devices keep running.

use anyhow::{Context, Result, ensure};
use std::sync::Arc;
use std::time::{Duration, Instant};
use viperstream::codec;
use viperstream::transport::{EmulatorConfig, EmulatorMode, LoopbackBackend};
use viperstream::{
    AcquisitionConfig, AcquisitionError, AcquisitionState, DeviceHandle, DeviceSelector, Frame, PacketInfo,
    ReadRequest, Registry, StatusFlags, Transition, ViperStream,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

async fn start_recording(registry: &Registry, handle: DeviceHandle) -> Result<u8> {
    let Transition::Armed { session_id } = registry.arm(handle).await? else {
        anyhow::bail!("device was not idle");
    };
    let triggered = registry.software_trigger(handle).await?;
    ensure!(triggered == Transition::Triggered { session_id }, "unexpected {triggered:?}");
    Ok(session_id)
}

fn wire_frames(session: u8, count: u16, channels: usize) -> Vec<u8> {
    (0..count)
        .flat_map(|sequence| {
            let samples = vec![sequence as i16; channels];
            let frame = Frame::new(
                sequence,
                sequence as u32 * 30,
                StatusFlags::new(0),
                session,
                0,
                codec::pack_samples(&samples),
            );
            codec::encode(&frame)
        })
        .collect()
}

#[tokio::test]
async fn emulated_recording_is_captured_and_replayed() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("emulated.bin");

    let config = EmulatorConfig { mode: EmulatorMode::Linear, channels: 16, probes: 1, ticks_per_receive: 16 };
    let registry = ViperStream::emulated(77, config)?;
    let handle = registry.create(DeviceSelector::Serial(77))?;
    let device = registry.lookup(handle)?;

    device.set_capture_path(&path)?;
    device.enable_capture(true).await?;
    start_recording(&registry, handle).await?;

    let mut live_infos: Vec<PacketInfo> = Vec::new();
    for _ in 0..3 {
        let batch = registry.read_packets(handle, 0, 16, 8).await?;
        for index in 0..batch.len() {
            let (info, samples) = batch.packet(index).context("packet index in range")?;
            for (channel, &sample) in samples.iter().enumerate() {
                ensure!(sample == EmulatorMode::Linear.sample(channel, info.timestamp));
            }
            live_infos.push(*info);
        }
    }
    ensure!(!live_infos.is_empty(), "emulator produced no packets");

    let disarmed = registry.arm(handle).await?;
    ensure!(disarmed == Transition::Disarmed { from: AcquisitionState::Recording });
    device.enable_capture(false).await?;
    registry.destroy(handle).await?;

    let mut replay = ViperStream::open(&path, 0)?;
    let mut replayed = Vec::new();
    loop {
        let batch = replay.read(ReadRequest::new(0, 16, 64))?;
        replayed.extend_from_slice(&batch.infos);
        if batch.is_end_of_stream() {
            break;
        }
    }

    // Capture holds every accepted frame, including ones never read
    ensure!(replayed.len() >= live_infos.len());
    ensure!(replayed[..live_infos.len()] == live_infos[..]);

    let stats = replay.diag_stats();
    ensure!(stats.error_total() == 0, "{stats:?}");
    ensure!(stats.triggers == 1, "only the first tick carries the trigger flag: {stats:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn devices_record_concurrently() -> Result<()> {
    init_tracing();
    let backend = LoopbackBackend::new();
    let feeders = [backend.add_device(10), backend.add_device(20)];
    let registry = Arc::new(ViperStream::with_backend(Arc::new(backend)));

    let mut tasks = Vec::new();
    for (serial, feeder) in [10u32, 20].into_iter().zip(feeders) {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let handle = registry.create(DeviceSelector::Serial(serial))?;
            let session = start_recording(&registry, handle).await?;
            feeder.push(&wire_frames(session, serial as u16, 4));

            let mut received = 0;
            while received < serial as usize {
                let batch = registry.read_packets(handle, 0, 4, 64).await?;
                received += batch.len();
            }
            let stats = registry.read_diag_stats(handle)?;
            ensure!(stats.packet_count == serial, "{stats:?}");
            ensure!(stats.error_total() == 0, "{stats:?}");
            Ok::<_, anyhow::Error>(handle)
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await??);
    }
    ensure!(registry.devices().len() == 2);

    registry.destroy(handles[0]).await?;
    ensure!(registry.acquisition_state(handles[1])? == AcquisitionState::Recording);
    registry.shutdown().await?;
    ensure!(registry.devices().is_empty());
    Ok(())
}

#[tokio::test]
async fn stale_handles_never_reach_a_reopened_device() -> Result<()> {
    init_tracing();
    let backend = LoopbackBackend::new();
    let _feeder = backend.add_device(3);
    let registry = ViperStream::with_backend(Arc::new(backend));

    let first = registry.create(DeviceSelector::from_raw(3)?)?;
    registry.destroy(first).await?;
    let second = registry.create(DeviceSelector::from_raw(-1)?)?;
    ensure!(first != second);
    ensure!(first.key().index == second.key().index, "slot is reused");

    for result in [registry.acquisition_state(first).map(|_| ()), registry.timestamp(first).map(|_| ())] {
        ensure!(matches!(result, Err(AcquisitionError::InvalidHandle { .. })));
    }
    ensure!(registry.info(second)?.state == AcquisitionState::Idle);
    Ok(())
}

#[tokio::test]
async fn configured_read_timeout_bounds_an_empty_read() -> Result<()> {
    init_tracing();
    let config = AcquisitionConfig::from_yaml_str("read_timeout_ms: 20\nprobe_queue_capacity: 256\n")?;
    let backend = LoopbackBackend::new();
    let _feeder = backend.add_device(1);
    let registry = ViperStream::with_config(Arc::new(backend), config)?;
    let handle = registry.create(DeviceSelector::Any)?;
    start_recording(&registry, handle).await?;

    let started = Instant::now();
    let batch = registry.read_packets(handle, 0, 4, 10).await?;
    ensure!(batch.is_empty());
    ensure!(started.elapsed() < Duration::from_secs(2));

    let invalid = AcquisitionConfig { probe_queue_capacity: 0, ..Default::default() };
    let err = ViperStream::with_config(Arc::new(LoopbackBackend::new()), invalid).unwrap_err();
    ensure!(matches!(err, AcquisitionError::Config { .. }), "{err}");
    Ok(())
}
