mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "roverlink", version, about = "Rover control link CLI")]
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
        env = "ROVERLINK_LOG",
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
    match cmd::run(cli.command, format) {
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
    fn parses_send_hex() {
        let cli = Cli::try_parse_from([
            "roverlink",
            "send",
            "--hex",
            "DE 64 64 55 55 DE 55 55 55 01",
            "--remote",
            "127.0.0.1:5001",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_hex_with_extended_type() {
        let err = Cli::try_parse_from([
            "roverlink",
            "send",
            "--hex",
            "AA0001",
            "--type",
            "heartbeat",
            "--json",
            "{}",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn type_requires_json() {
        let err = Cli::try_parse_from(["roverlink", "send", "--type", "telemetry"])
            .expect_err("--type alone should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_link_with_radio_and_fallback() {
        let cli = Cli::try_parse_from([
            "roverlink",
            "link",
            "--radio",
            "/dev/ttyUSB0",
            "--baud",
            "230400",
            "--fallback",
            "--protocol",
            "extended",
            "--duration",
            "30s",
        ])
        .expect("link args should parse");

        match cli.command {
            Command::Link(args) => {
                assert_eq!(args.link.radio.as_deref(), Some("/dev/ttyUSB0"));
                assert!(args.link.fallback);
            }
            other => panic!("expected link command, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_socket_address() {
        let err = Cli::try_parse_from(["roverlink", "listen", "--bind", "not-an-addr"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
