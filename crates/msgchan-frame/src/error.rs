/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared or supplied payload length exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream (zero-length read or write).
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for violations of the wire protocol rather than transport failures.
    pub fn is_protocol(&self) -> bool {
        matches!(self, FrameError::PayloadTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
