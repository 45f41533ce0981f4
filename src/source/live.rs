//! Live packet source reading from a basestation transport

use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{PacketBatch, ReadRequest, drain_queue};
use crate::acquisition::SharedControl;
use crate::codec::{FrameScanner, MAX_PROBES, ScanEvent};
use crate::error::HandleKind;
use crate::transport::Transport;
use crate::types::Frame;
use crate::{AcquisitionError, Result};

/// Reads frames from a transport and queues them per probe.
///
/// All probes share one decode pass and one diagnostics instance; a read for
/// one probe may therefore queue packets for the others.
pub struct LiveSource {
    transport: Arc<dyn Transport>,
    control: SharedControl,
    cancel: CancellationToken,
    scanner: FrameScanner,
    queues: [VecDeque<Frame>; MAX_PROBES as usize],
    queue_capacity: usize,
    receive_chunk: usize,
    rx_buf: Vec<u8>,
    epoch: u64,
}

impl std::fmt::Debug for LiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSource")
            .field("device", &self.transport.id())
            .field("queued", &self.queued())
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl LiveSource {
    pub fn new(
        transport: Arc<dyn Transport>,
        control: SharedControl,
        cancel: CancellationToken,
        queue_capacity: usize,
        receive_chunk: usize,
    ) -> Self {
        let epoch = control.lock().machine.epoch();
        Self {
            transport,
            control,
            cancel,
            scanner: FrameScanner::new(),
            queues: Default::default(),
            queue_capacity,
            receive_chunk,
            rx_buf: Vec::with_capacity(receive_chunk),
            epoch,
        }
    }

    /// Packets waiting per probe.
    pub fn queued(&self) -> [usize; MAX_PROBES as usize] {
        std::array::from_fn(|probe| self.queues[probe].len())
    }

    pub async fn read(&mut self, request: ReadRequest) -> Result<PacketBatch> {
        self.read_with(request, |_| {}).await
    }

    /// Read packets, calling `on_frame` for every frame that decoded cleanly,
    /// of any probe and any session, in arrival order.
    pub async fn read_with<F>(&mut self, request: ReadRequest, mut on_frame: F) -> Result<PacketBatch>
    where
        F: FnMut(&Frame) + Send,
    {
        request.validate()?;
        if self.cancel.is_cancelled() {
            return Err(AcquisitionError::invalid_handle(HandleKind::Device));
        }

        let timeout = self.sync_epoch();
        let probe = request.probe as usize;
        let deadline = tokio::time::Instant::now() + timeout;
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();

        while self.queues[probe].is_empty() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());

            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(device = %transport.id(), "Read cancelled");
                    return Err(AcquisitionError::invalid_handle(HandleKind::Device));
                }
                result = transport.receive(&mut self.rx_buf, self.receive_chunk, remaining) => result?,
            };

            if received > 0 {
                self.scanner.extend(&self.rx_buf);
                self.rx_buf.clear();
                self.process(&mut on_frame);
            }

            if remaining.is_zero() || (received == 0 && tokio::time::Instant::now() >= deadline) {
                break;
            }
        }

        drain_queue(&mut self.queues[probe], &request)
    }

    /// Drop packets from before the latest arm transition. Returns the read timeout.
    fn sync_epoch(&mut self) -> std::time::Duration {
        let control = self.control.lock();
        let epoch = control.machine.epoch();
        if epoch != self.epoch {
            self.epoch = epoch;
            let session = control.machine.current_session();
            let discarded = self.scanner.finish();
            for queue in &mut self.queues {
                queue.retain(|frame| Some(frame.session_id) == session);
            }
            debug!(epoch, ?session, discarded, "Source resynchronised to new session");
        }
        control.read_timeout
    }

    /// Decode buffered bytes, classify them and queue accepted frames.
    fn process<F>(&mut self, on_frame: &mut F)
    where
        F: FnMut(&Frame),
    {
        let mut framed = Vec::new();
        {
            let mut control = self.control.lock();
            while let Some(event) = self.scanner.next_event() {
                match event {
                    ScanEvent::Frame { frame, wire_len } => {
                        let accepted = control.diagnostics.observe_frame(&frame, wire_len).is_accepted();
                        if accepted {
                            control.machine.observe_timestamp(frame.timestamp);
                        }
                        framed.push((frame, accepted));
                    }
                    ScanEvent::Fault(error) => {
                        trace!(%error, "Framing fault");
                        if let Some(kind) = error.kind() {
                            control.diagnostics.observe_fault(kind);
                        }
                    }
                }
            }
        }

        let mut dropped = 0u32;
        for (frame, accepted) in framed {
            on_frame(&frame);
            if !accepted {
                continue;
            }
            let Some(queue) = self.queues.get_mut(frame.probe as usize) else {
                trace!(probe = frame.probe, "Frame for unknown probe");
                continue;
            };
            if queue.len() >= self.queue_capacity {
                queue.pop_front();
                dropped += 1;
            }
            queue.push_back(frame);
        }

        if dropped > 0 {
            warn!(dropped, "Probe queue full, dropping oldest packets");
            self.control.lock().diagnostics.observe_host_drop(dropped);
        }
    }
}
