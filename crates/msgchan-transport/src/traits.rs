use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A connected, bidirectional byte stream a message channel can own.
///
/// The channel splits one endpoint into three handles: one read by the
/// receive worker, one written by the send worker, and one kept only to shut
/// the connection down. Implementations must therefore support cloning into
/// handles that share the same underlying connection.
pub trait Endpoint: Read + Write + Send + Sync + 'static {
    /// Create another handle to the same connection.
    fn try_clone_endpoint(&self) -> std::io::Result<Self>
    where
        Self: Sized;

    /// Shut down both directions. Blocked reads and writes on every handle
    /// return promptly afterwards.
    fn shutdown(&self) -> std::io::Result<()>;

    /// Human-readable peer description.
    ///
    /// Fails with `NotConnected` when the endpoint has no peer, which is how
    /// channel construction detects an unusable socket.
    fn peer_label(&self) -> std::io::Result<String>;

    /// Set read timeout on the underlying stream.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Set write timeout on the underlying stream.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
}

impl Endpoint for TcpStream {
    fn try_clone_endpoint(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn shutdown(&self) -> std::io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn peer_label(&self) -> std::io::Result<String> {
        self.peer_addr().map(|addr| format!("tcp://{addr}"))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl Endpoint for std::os::unix::net::UnixStream {
    fn try_clone_endpoint(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn shutdown(&self) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, Shutdown::Both)
    }

    fn peer_label(&self) -> std::io::Result<String> {
        let addr = self.peer_addr()?;
        Ok(match addr.as_pathname() {
            Some(path) => format!("unix://{}", path.display()),
            None => "unix://(unnamed)".to_string(),
        })
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, timeout)
    }
}
