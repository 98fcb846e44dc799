//! Two fast producer threads and one slow consumer on each side of a loopback
//! connection. Shows that `send` never waits on the socket and that each
//! producer's messages arrive in order.
//!
//! Run with:
//!   cargo run --example producers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use msgchan::channel::MessageChannel;
use msgchan::transport::TcpTransport;

const PRODUCERS: usize = 2;
const BATCHES: usize = 4;
const PER_BATCH: usize = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let transport = TcpTransport::bind("127.0.0.1:0")?;
    let addr = transport.local_addr().to_string();

    let client = Arc::new(MessageChannel::open(TcpTransport::connect(&addr)?)?);
    let server = Arc::new(MessageChannel::open(transport.accept()?)?);

    let mut handles = Vec::new();
    for side in [&client, &server] {
        for producer in 0..PRODUCERS {
            let channel = Arc::clone(side);
            handles.push(thread::spawn(move || -> msgchan::channel::Result<()> {
                for batch in 0..BATCHES {
                    for i in 0..PER_BATCH {
                        channel.send(format!("producer {producer} batch {batch} msg {i}"))?;
                    }
                    thread::sleep(Duration::from_millis(20 * (producer as u64 + 1)));
                }
                Ok(())
            }));
        }
    }

    let expected = PRODUCERS * BATCHES * PER_BATCH;
    let mut consumers = Vec::new();
    for (name, side) in [("client", &client), ("server", &server)] {
        let channel = Arc::clone(side);
        consumers.push(thread::spawn(move || -> msgchan::channel::Result<()> {
            for _ in 0..expected {
                let message = channel.receive_timeout(Duration::from_secs(5))?;
                println!(
                    "[{name} received] {} (queued: {})",
                    String::from_utf8_lossy(&message),
                    channel.pending_receive_count()
                );
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }));
    }

    for handle in handles.into_iter().chain(consumers) {
        handle.join().map_err(|_| "worker thread panicked")??;
    }

    client.stop();
    server.stop();
    Ok(())
}
