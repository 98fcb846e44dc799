//! Connected byte-stream endpoints.
//!
//! The lowest layer of msgchan. A message channel needs nothing more than a
//! connected, bidirectional stream it can clone into independent read and
//! write handles and shut down from a third handle. [`Endpoint`] captures
//! exactly that; [`TcpTransport`] offers thin bind/accept/connect helpers for
//! callers that do not already own a socket.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::Endpoint;
