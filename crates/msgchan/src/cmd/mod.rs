use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use msgchan_channel::{BackpressurePolicy, ChannelConfig};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

/// How often idle loops re-check the Ctrl-C flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and print every message received.
    Listen(ListenArgs),
    /// Accept connections and echo every message back.
    Echo(EchoArgs),
    /// Connect and send messages from one or more producer threads.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, channel: ChannelArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, channel.load()?, format),
        Command::Echo(args) => echo::run(args, channel.load()?),
        Command::Send(args) => send::run(args, channel.load()?, format),
        Command::Version(args) => version::run(args),
    }
}

/// Channel tuning shared by every networked subcommand.
#[derive(Args, Debug, Default)]
pub struct ChannelArgs {
    /// JSON file with channel settings (queue bounds, payload limit, ...).
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    /// Largest accepted payload in bytes.
    #[arg(long, value_name = "BYTES", env = "MSGCHAN_MAX_PAYLOAD", global = true)]
    pub max_payload: Option<usize>,
    /// Send queue bound in messages.
    #[arg(long, value_name = "N", env = "MSGCHAN_SEND_QUEUE", global = true)]
    pub send_queue: Option<usize>,
    /// Fail sends on a full queue instead of blocking.
    #[arg(long, global = true)]
    pub reject_when_full: bool,
}

impl ChannelArgs {
    /// Config file first, then flags on top.
    pub fn load(&self) -> CliResult<ChannelConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|err| {
                    crate::exit::io_error(&format!("failed reading {}", path.display()), err)
                })?;
                serde_json::from_str::<ChannelConfig>(&text).map_err(|err| {
                    CliError::new(
                        USAGE,
                        format!("invalid config {}: {err}", path.display()),
                    )
                })?
            }
            None => ChannelConfig::default(),
        };

        if let Some(max) = self.max_payload {
            config.max_payload_size = max;
        }
        if let Some(capacity) = self.send_queue {
            config.send_queue_capacity = Some(capacity);
        }
        if self.reject_when_full {
            config.backpressure = BackpressurePolicy::Reject;
        }

        config
            .validate()
            .map_err(|err| CliError::new(USAGE, err.to_string()))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// TCP address to bind (e.g. 127.0.0.1:9900).
    pub addr: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// TCP address to bind (e.g. 127.0.0.1:9900).
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// TCP address to connect to.
    pub addr: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Messages sent by each producer thread.
    #[arg(long, default_value = "1")]
    pub repeat: usize,
    /// Number of producer threads.
    #[arg(long, default_value = "1")]
    pub threads: usize,
    /// Wait for N reply messages and print them.
    #[arg(long, value_name = "N")]
    pub wait: Option<usize>,
    /// Time limit for the connection, the flush and each reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
