use std::time::Duration;

use msgchan_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Bound applied to each queue by [`ChannelConfig::bounded`], in messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// What `send` does when a bounded send queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Block the producer until the send worker frees a slot.
    #[default]
    Block,
    /// Fail immediately with `ChannelError::QueueFull`.
    Reject,
}

/// Controls queue bounds, frame limits and socket timeouts of a channel.
///
/// The default leaves both queues unbounded, so `send` never suspends the
/// caller. Bounds and backpressure are opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Largest payload accepted by `send` and by the receive worker.
    pub max_payload_size: usize,
    /// Send queue bound in messages; `None` for unbounded.
    pub send_queue_capacity: Option<usize>,
    /// Receive queue bound in messages; `None` for unbounded. When full, the
    /// receive worker stops reading until a consumer catches up.
    pub recv_queue_capacity: Option<usize>,
    /// Behavior of `send` on a full send queue.
    pub backpressure: BackpressurePolicy,
    /// Socket write timeout in milliseconds. A timeout is a fatal send fault.
    pub write_timeout_ms: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            send_queue_capacity: None,
            recv_queue_capacity: None,
            backpressure: BackpressurePolicy::Block,
            write_timeout_ms: None,
        }
    }
}

impl ChannelConfig {
    /// Both queues bounded at [`DEFAULT_QUEUE_CAPACITY`] with the given policy.
    pub fn bounded(policy: BackpressurePolicy) -> Self {
        Self {
            send_queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            recv_queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            backpressure: policy,
            ..Self::default()
        }
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn with_send_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    pub fn with_recv_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.recv_queue_capacity = capacity;
        self
    }

    pub fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1));
        self
    }

    /// Socket write timeout, if any.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings that would make the channel unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size > u32::MAX as usize {
            return Err(ChannelError::InvalidConfig(format!(
                "max_payload_size {} exceeds the 32-bit length prefix",
                self.max_payload_size
            )));
        }
        if self.send_queue_capacity == Some(0) {
            return Err(ChannelError::InvalidConfig(
                "send_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.recv_queue_capacity == Some(0) {
            return Err(ChannelError::InvalidConfig(
                "recv_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.write_timeout_ms == Some(0) {
            return Err(ChannelError::InvalidConfig(
                "write_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            // The receive worker blocks until data or shutdown.
            read_timeout: None,
            write_timeout: self.write_timeout(),
        }
    }
}
