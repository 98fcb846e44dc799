use std::fs;
use std::thread;

use bytes::Bytes;
use msgchan_channel::{ChannelConfig, MessageChannel};
use msgchan_transport::TcpTransport;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{channel_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, config: ChannelConfig, format: OutputFormat) -> CliResult<i32> {
    if args.threads == 0 {
        return Err(CliError::new(USAGE, "--threads must be at least 1"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let stream = TcpTransport::connect_timeout(&args.addr, timeout)
        .map_err(|err| transport_error("connect failed", err))?;
    let channel = MessageChannel::open_with_config(stream, config)
        .map_err(|err| channel_error("channel setup failed", err))?;

    produce(&channel, &payload, args.threads, args.repeat)?;
    channel
        .flush(Some(timeout))
        .map_err(|err| channel_error("flush failed", err))?;
    tracing::info!(
        peer = channel.peer_label(),
        sent = args.threads * args.repeat,
        "all messages written"
    );

    if let Some(expected) = args.wait {
        for seq in 1..=expected {
            let reply = channel
                .receive_timeout(timeout)
                .map_err(|err| channel_error("receive failed", err))?;
            print_message(&reply, seq, channel.peer_label(), format);
        }
    }

    channel.stop();
    Ok(SUCCESS)
}

/// Send `repeat` copies of `payload` from each of `threads` producer threads.
fn produce(
    channel: &MessageChannel,
    payload: &Bytes,
    threads: usize,
    repeat: usize,
) -> CliResult<()> {
    thread::scope(|scope| {
        let producers: Vec<_> = (0..threads)
            .map(|_| {
                let payload = payload.clone();
                scope.spawn(move || -> msgchan_channel::Result<()> {
                    for _ in 0..repeat {
                        channel.send(payload.clone())?;
                    }
                    Ok(())
                })
            })
            .collect();

        for producer in producers {
            match producer.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(channel_error("send failed", err)),
                Err(_) => return Err(CliError::new(INTERNAL, "producer thread panicked")),
            }
        }
        Ok(())
    })
}

fn resolve_payload(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(data) = &args.data {
        return Ok(Bytes::copy_from_slice(data.as_bytes()));
    }
    if let Some(path) = &args.file {
        return fs::read(path).map(Bytes::from).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Bytes::new())
}
