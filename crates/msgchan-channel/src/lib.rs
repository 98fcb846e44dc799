//! Duplex message channel over a connected socket.
//!
//! This is the "just works" layer. Hand [`MessageChannel`] a connected
//! endpoint; it spawns one worker per direction and exposes non-blocking
//! `send` and blocking `receive` of whole messages. Producers and consumers
//! never touch the socket: two FIFO queues sit between them and the workers.

pub mod channel;
pub mod config;
pub mod error;
pub mod queue;
pub mod state;
mod worker;

pub use channel::{Message, MessageChannel};
pub use config::{BackpressurePolicy, ChannelConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{ChannelError, Direction, Fault, FaultKind, Result};
pub use queue::{Drain, MessageQueue, Pop, PushError};
pub use state::ChannelStatus;
