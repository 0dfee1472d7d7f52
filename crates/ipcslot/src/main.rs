mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "ipcslot",
    version,
    about = "Shared-memory request/response channels"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "IPCSLOT_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_subcommand() {
        let cli = Cli::try_parse_from([
            "ipcslot",
            "request",
            "chan1",
            "--data",
            "ping",
            "--size",
            "1024",
            "--timeout",
            "infinite",
        ])
        .expect("request args should parse");

        match cli.command {
            Command::Request(args) => {
                assert_eq!(args.layout.size, 1024);
                assert_eq!(args.data.as_deref(), Some("ping"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "ipcslot",
            "request",
            "chan1",
            "--data",
            "ping",
            "--file",
            "/tmp/payload.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn serve_defaults_to_echo() {
        let cli = Cli::try_parse_from(["ipcslot", "serve", "chan1"]).expect("serve should parse");
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.mode, cmd::ServeMode::Echo);
                assert_eq!(args.layout.size, ipcslot_channel::DEFAULT_SEGMENT_SIZE);
                assert_eq!(args.count, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn single_signal_flag_is_not_offered() {
        let err = Cli::try_parse_from(["ipcslot", "serve", "chan1", "--single-signal"])
            .expect_err("flag should be unknown");
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
