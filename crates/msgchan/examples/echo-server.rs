//! Minimal echo server: accepts one peer and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:9900 --data hello --wait 1

use msgchan::channel::{ChannelError, MessageChannel};
use msgchan::transport::TcpTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let transport = TcpTransport::bind("127.0.0.1:9900")?;
    eprintln!("Listening on {}", transport.local_addr());

    let channel = MessageChannel::open(transport.accept()?)?;
    eprintln!("Peer connected: {}", channel.peer_label());

    loop {
        match channel.receive() {
            Ok(message) => {
                eprintln!("Received {} bytes", message.len());
                channel.send(message)?;
            }
            Err(ChannelError::Failed(fault)) => {
                eprintln!("Peer disconnected: {fault}");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}
