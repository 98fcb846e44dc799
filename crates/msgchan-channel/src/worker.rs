use std::io::{Read, Write};
use std::sync::Arc;

use msgchan_frame::{FrameReader, FrameWriter};
use tracing::{debug, trace};

use crate::channel::Shared;
use crate::config::BackpressurePolicy;
use crate::error::{Direction, Fault};

/// Drain the send queue onto the socket until cancelled or a write fails.
pub(crate) fn run_send_worker<W: Write>(mut writer: FrameWriter<W>, shared: Arc<Shared>) {
    debug!(channel = shared.id, peer = %shared.label, "send worker started");
    let mut written = 0u64;

    while let Some(message) = shared.outbound.take_for_io() {
        match writer.send(&message) {
            Ok(()) => {
                shared.outbound.complete_io();
                written += 1;
                trace!(channel = shared.id, size = message.len(), "frame written");
            }
            Err(err) => {
                // Not delivered (possibly partially written); keep it for take_unsent.
                shared.outbound.requeue_front(message);
                shared.fail(Fault::from_frame_error(Direction::Send, &err));
                break;
            }
        }
    }

    debug!(channel = shared.id, written, "send worker exited");
    shared.worker_exited();
}

/// Read frames into the receive queue until cancelled or a read fails.
pub(crate) fn run_recv_worker<R: Read>(mut reader: FrameReader<R>, shared: Arc<Shared>) {
    debug!(channel = shared.id, peer = %shared.label, "receive worker started");
    let mut received = 0u64;

    loop {
        match reader.read_frame() {
            Ok(message) => {
                let size = message.len();
                if shared
                    .inbound
                    .push(message, BackpressurePolicy::Block)
                    .is_err()
                {
                    break;
                }
                received += 1;
                trace!(channel = shared.id, size, "frame received");
            }
            Err(err) => {
                shared.fail(Fault::from_frame_error(Direction::Receive, &err));
                break;
            }
        }
    }

    debug!(channel = shared.id, received, "receive worker exited");
    shared.worker_exited();
}
