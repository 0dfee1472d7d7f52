use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use ipcslot_channel::{ChannelConfig, DEFAULT_SEGMENT_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod cleanup;
pub mod names;
pub mod request;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a channel and answer requests until interrupted.
    Serve(ServeArgs),
    /// Send one request to a running server and print the reply.
    Request(RequestArgs),
    /// Print the OS object names a channel uses.
    Names(NamesArgs),
    /// Remove objects left behind by a process that exited uncleanly.
    Cleanup(CleanupArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Names(args) => names::run(args, format),
        Command::Cleanup(args) => cleanup::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Segment layout flags shared by `serve` and `request`. Both sides must match.
#[derive(Args, Debug, Clone, Copy)]
pub struct LayoutArgs {
    /// Segment size in bytes.
    #[arg(long, default_value_t = DEFAULT_SEGMENT_SIZE)]
    pub size: usize,
}

impl LayoutArgs {
    /// Always the dual-signal layout; the request loop cannot run on one signal.
    pub fn config(&self) -> ChannelConfig {
        ChannelConfig::default().with_size(self.size)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ServeMode {
    /// Reply with the request bytes.
    Echo,
    /// Reply with no content.
    Ack,
    /// Reply with the request in ASCII upper case.
    Upper,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Channel name.
    pub name: String,
    #[command(flatten)]
    pub layout: LayoutArgs,
    /// How to answer each request.
    #[arg(long, value_enum, default_value = "echo")]
    pub mode: ServeMode,
    /// Exit after answering N requests.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Channel name.
    pub name: String,
    #[command(flatten)]
    pub layout: LayoutArgs,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// How long to wait for the reply (e.g. 5s, 500ms, infinite).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct NamesArgs {
    /// Channel name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Channel name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, `5` (seconds) or `infinite`. `None` means no deadline.
pub fn parse_timeout(input: &str) -> CliResult<Option<Duration>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("infinite") {
        return Ok(None);
    }
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
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
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(Some(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    }))
}
