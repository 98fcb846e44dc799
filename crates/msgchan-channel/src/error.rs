use std::fmt;
use std::time::Duration;

use msgchan_frame::FrameError;

/// Which worker a fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

/// Classification of a fatal worker error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The peer ended the stream.
    ConnectionClosed,
    /// The peer violated the wire protocol (e.g. oversized frame).
    Protocol,
    /// A read or write primitive failed.
    Io,
}

/// The first fatal error observed by either worker.
///
/// Cloneable so every caller blocked on the channel can be handed a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub direction: Direction,
    pub kind: FaultKind,
    /// Underlying I/O error kind, when `kind` is `Io`.
    pub io_kind: Option<std::io::ErrorKind>,
    pub message: String,
}

impl Fault {
    pub(crate) fn from_frame_error(direction: Direction, err: &FrameError) -> Self {
        let (kind, io_kind) = match err {
            FrameError::ConnectionClosed => (FaultKind::ConnectionClosed, None),
            FrameError::PayloadTooLarge { .. } => (FaultKind::Protocol, None),
            FrameError::Io(io) => (FaultKind::Io, Some(io.kind())),
        };
        Self {
            direction,
            kind,
            io_kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} worker: {}", self.direction, self.message)
    }
}

/// Errors surfaced by [`crate::MessageChannel`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The endpoint handed to the channel cannot be used.
    #[error("channel construction failed: {context}: {source}")]
    Construction {
        context: &'static str,
        source: std::io::Error,
    },

    /// The configuration is inconsistent.
    #[error("invalid channel config: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be started.
    #[error("failed to spawn {direction} worker: {source}")]
    Spawn {
        direction: Direction,
        source: std::io::Error,
    },

    /// Frame-level error for a message rejected before queueing.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The bounded send queue is full and the policy is to reject.
    #[error("send queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// No message arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The channel was stopped by its owner.
    #[error("channel stopped")]
    Stopped,

    /// A worker hit a fatal error and the channel shut itself down.
    #[error("channel failed: {0}")]
    Failed(Fault),
}

impl ChannelError {
    /// True once the channel can no longer carry messages.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::Stopped | ChannelError::Failed(_) | ChannelError::Construction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classifies_frame_errors() {
        let closed = Fault::from_frame_error(Direction::Receive, &FrameError::ConnectionClosed);
        assert_eq!(closed.kind, FaultKind::ConnectionClosed);
        assert_eq!(closed.io_kind, None);

        let protocol = Fault::from_frame_error(
            Direction::Receive,
            &FrameError::PayloadTooLarge { size: 10, max: 4 },
        );
        assert_eq!(protocol.kind, FaultKind::Protocol);

        let io = Fault::from_frame_error(
            Direction::Send,
            &FrameError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
        );
        assert_eq!(io.kind, FaultKind::Io);
        assert_eq!(io.io_kind, Some(std::io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn fault_display_names_direction() {
        let fault = Fault::from_frame_error(Direction::Send, &FrameError::ConnectionClosed);
        assert_eq!(fault.to_string(), "send worker: connection closed");
        assert_eq!(
            ChannelError::Failed(fault).to_string(),
            "channel failed: send worker: connection closed"
        );
    }

    #[test]
    fn terminal_errors() {
        assert!(ChannelError::Stopped.is_terminal());
        assert!(!ChannelError::QueueFull { capacity: 1 }.is_terminal());
        assert!(!ChannelError::Timeout(Duration::from_millis(1)).is_terminal());
    }
}
