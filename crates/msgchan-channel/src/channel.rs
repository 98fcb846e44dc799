use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use msgchan_frame::{FrameError, FrameReader, FrameWriter};
use msgchan_transport::Endpoint;
use tracing::{debug, info, warn};

use crate::config::{BackpressurePolicy, ChannelConfig};
use crate::error::{ChannelError, Direction, Fault, Result};
use crate::queue::{Drain, MessageQueue, Pop, PushError};
use crate::state::{ChannelStatus, StatusCell};
use crate::worker::{run_recv_worker, run_send_worker};

/// An owned, counted byte sequence. Zero length is valid.
pub type Message = Bytes;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between the channel owner and its two workers.
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) label: String,
    pub(crate) status: StatusCell,
    pub(crate) outbound: MessageQueue,
    pub(crate) inbound: MessageQueue,
    fault: Mutex<Option<Fault>>,
    live_workers: AtomicUsize,
    /// Only used to shut the connection down; never read or written.
    control: Box<dyn Endpoint>,
}

impl Shared {
    fn fault_slot(&self) -> MutexGuard<'_, Option<Fault>> {
        self.fault.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a worker's fatal error and stop the whole channel.
    ///
    /// Only the first fault while running is kept; errors caused by an
    /// explicit stop (or by the other worker's cancellation) are logged and
    /// ignored.
    pub(crate) fn fail(&self, fault: Fault) {
        let mut slot = self.fault_slot();
        if !self
            .status
            .transition(ChannelStatus::Running, ChannelStatus::Stopping)
        {
            debug!(channel = self.id, error = %fault, "worker error after shutdown began");
            return;
        }

        warn!(
            channel = self.id,
            peer = %self.label,
            direction = %fault.direction,
            error = %fault.message,
            "worker failed; stopping channel"
        );
        *slot = Some(fault);
        drop(slot);

        self.cancel(false);
    }

    /// Close both queues and shut the endpoint down so both workers return.
    fn cancel(&self, discard: bool) {
        self.outbound.close();
        self.inbound.close();

        if discard {
            let unsent = self.outbound.clear();
            let unread = self.inbound.clear();
            if unsent > 0 || unread > 0 {
                debug!(channel = self.id, unsent, unread, "discarded queued messages");
            }
        }

        if let Err(err) = self.control.shutdown() {
            // The peer may already have torn the connection down.
            debug!(channel = self.id, error = %err, "endpoint shutdown failed");
        }
    }

    pub(crate) fn worker_exited(&self) {
        if self.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.status
                .transition(ChannelStatus::Stopping, ChannelStatus::Stopped);
        }
    }

    /// The error callers get once the channel no longer carries messages.
    fn closed_error(&self) -> ChannelError {
        match self.fault_slot().clone() {
            Some(fault) => ChannelError::Failed(fault),
            None => ChannelError::Stopped,
        }
    }
}

/// Duplex message channel over one connected endpoint.
///
/// Owns the endpoint exclusively, a send queue drained by a send worker
/// thread, and a receive queue filled by a receive worker thread. All
/// methods take `&self`; share the channel between producer and consumer
/// threads with an `Arc`.
///
/// Ordering: messages from one producer thread reach the peer in the order
/// that thread sent them. There is no ordering across producer threads.
pub struct MessageChannel {
    shared: Arc<Shared>,
    config: ChannelConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageChannel {
    /// Open a channel with default configuration.
    pub fn open<E: Endpoint>(endpoint: E) -> Result<Self> {
        Self::open_with_config(endpoint, ChannelConfig::default())
    }

    /// Validate the endpoint, split it into worker handles and start both workers.
    pub fn open_with_config<E: Endpoint>(endpoint: E, config: ChannelConfig) -> Result<Self> {
        config.validate()?;

        let label = endpoint
            .peer_label()
            .map_err(|source| ChannelError::Construction {
                context: "endpoint is not connected",
                source,
            })?;
        let reader_stream =
            endpoint
                .try_clone_endpoint()
                .map_err(|source| ChannelError::Construction {
                    context: "failed to clone read handle",
                    source,
                })?;
        let control =
            endpoint
                .try_clone_endpoint()
                .map_err(|source| ChannelError::Construction {
                    context: "failed to clone control handle",
                    source,
                })?;

        let frame_config = config.frame_config();
        let reader = FrameReader::with_config_endpoint(reader_stream, frame_config.clone())
            .map_err(|err| construction_error("failed to configure read handle", err))?;
        let writer = FrameWriter::with_config_endpoint(endpoint, frame_config)
            .map_err(|err| construction_error("failed to configure write handle", err))?;

        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared {
            id,
            label,
            status: StatusCell::new(),
            outbound: MessageQueue::new(config.send_queue_capacity),
            inbound: MessageQueue::new(config.recv_queue_capacity),
            fault: Mutex::new(None),
            live_workers: AtomicUsize::new(2),
            control: Box::new(control),
        });

        // Running before spawn so a worker failing immediately is recorded.
        shared.status.advance_to(ChannelStatus::Running);

        let send_handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("msgchan-send-{id}"))
                .spawn(move || run_send_worker(writer, shared))
        };
        let send_handle = match send_handle {
            Ok(handle) => handle,
            Err(source) => {
                shared.status.advance_to(ChannelStatus::Stopping);
                shared.cancel(true);
                shared.status.advance_to(ChannelStatus::Stopped);
                return Err(ChannelError::Spawn {
                    direction: Direction::Send,
                    source,
                });
            }
        };

        let recv_handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("msgchan-recv-{id}"))
                .spawn(move || run_recv_worker(reader, shared))
        };
        let recv_handle = match recv_handle {
            Ok(handle) => handle,
            Err(source) => {
                shared.status.advance_to(ChannelStatus::Stopping);
                shared.cancel(true);
                let _ = send_handle.join();
                shared.status.advance_to(ChannelStatus::Stopped);
                return Err(ChannelError::Spawn {
                    direction: Direction::Receive,
                    source,
                });
            }
        };

        info!(channel = id, peer = %shared.label, "message channel opened");

        Ok(Self {
            shared,
            config,
            workers: Mutex::new(vec![send_handle, recv_handle]),
        })
    }

    /// Queue a message for delivery.
    ///
    /// Never performs I/O. With the default unbounded send queue it returns
    /// immediately; a bounded queue that is full follows the configured
    /// [`BackpressurePolicy`].
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(payload.into(), self.config.backpressure)
    }

    /// Queue a message without ever blocking.
    pub fn try_send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(payload.into(), BackpressurePolicy::Reject)
    }

    fn enqueue(&self, payload: Bytes, policy: BackpressurePolicy) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            }
            .into());
        }
        if self.shared.status.load() != ChannelStatus::Running {
            return Err(self.shared.closed_error());
        }

        match self.shared.outbound.push(payload, policy) {
            Ok(()) => Ok(()),
            Err(PushError::Full) => Err(ChannelError::QueueFull {
                capacity: self.shared.outbound.capacity().unwrap_or(usize::MAX),
            }),
            Err(PushError::Closed) => Err(self.shared.closed_error()),
        }
    }

    /// Take the next delivered message, blocking until one arrives.
    ///
    /// Messages that arrived before a failure are still returned; after
    /// that, fails with `ChannelError::Failed` (or `Stopped` after `stop`).
    pub fn receive(&self) -> Result<Message> {
        self.shared
            .inbound
            .pop()
            .ok_or_else(|| self.shared.closed_error())
    }

    /// Like [`receive`](Self::receive) but fails with `ChannelError::Timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Message> {
        match self.shared.inbound.pop_timeout(timeout) {
            Pop::Item(message) => Ok(message),
            Pop::Empty => Err(ChannelError::Timeout(timeout)),
            Pop::Closed => Err(self.shared.closed_error()),
        }
    }

    /// Take the next delivered message if one is already queued.
    pub fn try_receive(&self) -> Result<Option<Message>> {
        match self.shared.inbound.try_pop() {
            Pop::Item(message) => Ok(Some(message)),
            Pop::Empty => Ok(None),
            Pop::Closed => Err(self.shared.closed_error()),
        }
    }

    /// Wait until every message queued so far has been written to the socket.
    pub fn flush(&self, timeout: Option<Duration>) -> Result<()> {
        match self.shared.outbound.wait_drained(timeout) {
            Drain::Drained => Ok(()),
            Drain::TimedOut => Err(ChannelError::Timeout(timeout.unwrap_or_default())),
            Drain::Closed => Err(self.shared.closed_error()),
        }
    }

    /// Messages waiting for the send worker.
    pub fn pending_send_count(&self) -> usize {
        self.shared.outbound.len()
    }

    /// Messages waiting for a consumer.
    pub fn pending_receive_count(&self) -> usize {
        self.shared.inbound.len()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ChannelStatus {
        self.shared.status.load()
    }

    /// The fatal worker error that stopped the channel, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.shared.fault_slot().clone()
    }

    /// Recover messages that were never written because the channel failed.
    ///
    /// Returns an empty vector while the channel is running and after
    /// `stop`, which discards them.
    pub fn take_unsent(&self) -> Vec<Message> {
        if self.status() == ChannelStatus::Running {
            return Vec::new();
        }
        self.shared.outbound.drain_all()
    }

    /// Process-unique channel id, as used in log fields.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Peer description captured at construction.
    pub fn peer_label(&self) -> &str {
        &self.shared.label
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Stop both workers and discard any queued messages. Idempotent.
    ///
    /// Shuts the endpoint down so a worker blocked in I/O returns, then
    /// joins both workers. Blocked `receive` and `send` callers wake with
    /// `ChannelError::Stopped` (or `Failed` if a worker had already failed).
    pub fn stop(&self) {
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if workers.is_empty() && self.status() == ChannelStatus::Stopped {
            return;
        }

        if self
            .shared
            .status
            .transition(ChannelStatus::Running, ChannelStatus::Stopping)
        {
            info!(channel = self.shared.id, peer = %self.shared.label, "stopping message channel");
        }
        self.shared.cancel(true);

        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!(channel = self.shared.id, "worker thread panicked");
            }
        }
        self.shared.status.advance_to(ChannelStatus::Stopped);
        debug!(channel = self.shared.id, "message channel stopped");
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.label)
            .field("status", &self.status())
            .field("pending_send", &self.pending_send_count())
            .field("pending_receive", &self.pending_receive_count())
            .finish()
    }
}

fn construction_error(context: &'static str, err: FrameError) -> ChannelError {
    match err {
        FrameError::Io(source) => ChannelError::Construction { context, source },
        other => ChannelError::Frame(other),
    }
}
