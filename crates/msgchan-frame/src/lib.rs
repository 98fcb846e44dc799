//! Length-prefixed message framing.
//!
//! Every message travels as one frame:
//! - A 4-byte big-endian (network order) unsigned payload length
//! - Exactly that many payload bytes
//!
//! There is no magic, delimiter or terminator. Payloads are opaque counted
//! bytes and may contain zeros. Readers never hand out partial frames.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
pub use codec::{
    decode_frame, encode_frame, encoded_len, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
