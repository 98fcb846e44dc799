use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use msgchan_channel::{ChannelConfig, ChannelError, MessageChannel};
use msgchan_transport::TcpTransport;

use crate::cmd::listen::is_peer_hangup;
use crate::cmd::{install_ctrlc_handler, EchoArgs, POLL_INTERVAL};
use crate::exit::{transport_error, CliResult, SUCCESS};

pub fn run(args: EchoArgs, config: ChannelConfig) -> CliResult<i32> {
    let transport =
        TcpTransport::bind(&args.addr).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut next_conn = 0u64;
    while running.load(Ordering::SeqCst) {
        let stream = transport
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;

        next_conn += 1;
        let config = config.clone();
        let running = running.clone();
        let spawned = thread::Builder::new()
            .name(format!("echo-conn-{next_conn}"))
            .spawn(move || serve_connection(stream, config, &running));
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to start connection thread");
        }
    }

    Ok(SUCCESS)
}

/// Echo one peer's messages until it disconnects.
fn serve_connection(stream: TcpStream, config: ChannelConfig, running: &AtomicBool) {
    let channel = match MessageChannel::open_with_config(stream, config) {
        Ok(channel) => channel,
        Err(err) => {
            tracing::warn!(error = %err, "channel setup failed");
            return;
        }
    };

    let mut echoed = 0u64;
    while running.load(Ordering::SeqCst) {
        let message = match channel.receive_timeout(POLL_INTERVAL) {
            Ok(message) => message,
            Err(ChannelError::Timeout(_)) => continue,
            Err(err) if is_peer_hangup(&err) => break,
            Err(err) => {
                tracing::warn!(peer = channel.peer_label(), error = %err, "receive failed");
                break;
            }
        };

        tracing::debug!(peer = channel.peer_label(), size = message.len(), "echoing message");
        match channel.send(message) {
            Ok(()) => echoed += 1,
            Err(err) => {
                tracing::warn!(peer = channel.peer_label(), error = %err, "echo send failed");
                if should_drop_connection(&err) {
                    break;
                }
            }
        }
    }

    tracing::info!(peer = channel.peer_label(), echoed, "connection closed");
}

/// A full queue (reject policy) or an oversized reply only loses that one
/// message; a stopped or failed channel ends the connection.
fn should_drop_connection(err: &ChannelError) -> bool {
    err.is_terminal()
}
