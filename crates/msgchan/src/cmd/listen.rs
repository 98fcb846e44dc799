use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use msgchan_channel::{ChannelConfig, ChannelError, FaultKind, MessageChannel};
use msgchan_transport::TcpTransport;

use crate::cmd::{install_ctrlc_handler, ListenArgs, POLL_INTERVAL};
use crate::exit::{channel_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, config: ChannelConfig, format: OutputFormat) -> CliResult<i32> {
    let transport =
        TcpTransport::bind(&args.addr).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let stream = transport
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let channel = MessageChannel::open_with_config(stream, config.clone())
            .map_err(|err| channel_error("channel setup failed", err))?;

        while running.load(Ordering::SeqCst) {
            let message = match channel.receive_timeout(POLL_INTERVAL) {
                Ok(message) => message,
                Err(ChannelError::Timeout(_)) => continue,
                Err(err) if is_peer_hangup(&err) => {
                    tracing::info!(peer = channel.peer_label(), "peer disconnected");
                    break;
                }
                Err(err) => return Err(channel_error("receive failed", err)),
            };

            printed = printed.saturating_add(1);
            print_message(&message, printed, channel.peer_label(), format);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

/// The peer going away ends one connection, not the listener.
pub fn is_peer_hangup(err: &ChannelError) -> bool {
    match err {
        ChannelError::Failed(fault) => matches!(
            fault.kind,
            FaultKind::ConnectionClosed | FaultKind::Io
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgchan_channel::{Direction, Fault};

    fn failed(kind: FaultKind) -> ChannelError {
        ChannelError::Failed(Fault {
            direction: Direction::Receive,
            kind,
            io_kind: None,
            message: "test".to_string(),
        })
    }

    #[test]
    fn hangup_classification() {
        assert!(is_peer_hangup(&failed(FaultKind::ConnectionClosed)));
        assert!(is_peer_hangup(&failed(FaultKind::Io)));
        assert!(!is_peer_hangup(&failed(FaultKind::Protocol)));
        assert!(!is_peer_hangup(&ChannelError::Stopped));
    }
}
