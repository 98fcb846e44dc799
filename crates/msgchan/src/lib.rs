//! Duplex message channels over connected sockets.
//!
//! msgchan turns a connected TCP or Unix stream into a channel of whole
//! messages. Each message travels as a 4-byte big-endian length followed by
//! its payload. Producers queue messages without touching the socket and
//! consumers block on a receive queue, while two worker threads per channel
//! do the I/O.
//!
//! # Crate Structure
//!
//! - [`transport`]: connected endpoints and the TCP listener
//! - [`frame`]: length-prefixed framing over byte streams
//! - [`channel`]: the queued, threaded [`channel::MessageChannel`]
//!
//! ```no_run
//! use msgchan::channel::MessageChannel;
//! use msgchan::transport::TcpTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = MessageChannel::open(TcpTransport::connect("127.0.0.1:9900")?)?;
//! channel.send("hello")?;
//! let reply = channel.receive()?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use msgchan_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use msgchan_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use msgchan_channel::*;
}
