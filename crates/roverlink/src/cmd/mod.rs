use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use roverlink_frame::ProtocolVersion;
use roverlink_link::LinkConfig;
use roverlink_transport::{RadioConfig, TransportConfig, UdpConfig};

use crate::exit::{link_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod link;
pub mod listen;
pub mod probe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the link: heartbeats, link state and received messages.
    Link(LinkRunArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Print received frames without sending heartbeats.
    Listen(ListenArgs),
    /// Check which transports can be opened.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Link(args) => link::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ProtocolArg {
    Compact,
    Extended,
}

impl From<ProtocolArg> for ProtocolVersion {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Compact => ProtocolVersion::Compact,
            ProtocolArg::Extended => ProtocolVersion::Extended,
        }
    }
}

/// Transport and codec selection shared by every link-facing command.
#[derive(Args, Debug, Default)]
pub struct LinkArgs {
    /// JSON link config; flags below override its values.
    #[arg(long, value_name = "FILE", env = "ROVERLINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Serial device of the radio modem. Without it the UDP simulation link is used.
    #[arg(long, value_name = "PORT", env = "ROVERLINK_RADIO")]
    pub radio: Option<String>,
    /// Radio line rate.
    #[arg(long, value_name = "BAUD", env = "ROVERLINK_BAUD")]
    pub baud: Option<u32>,
    /// Local UDP address to receive on.
    #[arg(long, value_name = "ADDR", env = "ROVERLINK_BIND")]
    pub bind: Option<SocketAddr>,
    /// UDP address of the peer.
    #[arg(long, value_name = "ADDR", env = "ROVERLINK_REMOTE")]
    pub remote: Option<SocketAddr>,
    /// Wire codec.
    #[arg(long, value_name = "PROTOCOL", env = "ROVERLINK_PROTOCOL")]
    pub protocol: Option<ProtocolArg>,
    /// Fall back to UDP when the radio cannot be opened.
    #[arg(long)]
    pub fallback: bool,
}

impl LinkArgs {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve(&self) -> CliResult<LinkConfig> {
        let mut config = match &self.config {
            Some(path) => {
                LinkConfig::from_json_file(path).map_err(|err| link_error("config", err))?
            }
            None => LinkConfig::default(),
        };

        let udp_override = self.bind.is_some() || self.remote.is_some();
        let mut udp = match (&config.transport, &config.fallback) {
            (TransportConfig::Simulated(udp), _) => udp.clone(),
            (_, Some(udp)) => udp.clone(),
            _ => UdpConfig::default(),
        };
        if let Some(bind) = self.bind {
            udp.bind = bind;
        }
        if let Some(remote) = self.remote {
            udp.remote = remote;
        }

        if let Some(port) = &self.radio {
            let mut radio = match &config.transport {
                TransportConfig::Radio(radio) => radio.clone(),
                TransportConfig::Simulated(_) => RadioConfig::default(),
            };
            radio.port = port.clone();
            config.transport = TransportConfig::Radio(radio);
        }
        if let Some(baud) = self.baud {
            match &mut config.transport {
                TransportConfig::Radio(radio) => radio.baud = baud,
                TransportConfig::Simulated(_) => {
                    return Err(CliError::usage("--baud requires a radio transport"));
                }
            }
        }

        match &mut config.transport {
            TransportConfig::Simulated(current) => *current = udp,
            TransportConfig::Radio(_) => {
                if self.fallback || (udp_override && config.fallback.is_some()) {
                    config.fallback = Some(udp);
                }
            }
        }
        if self.fallback && matches!(config.transport, TransportConfig::Simulated(_)) {
            return Err(CliError::usage("--fallback requires --radio"));
        }

        if let Some(protocol) = self.protocol {
            config.protocol = protocol.into();
        }
        config
            .validate()
            .map_err(|err| link_error("config", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct LinkRunArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Stop after this long (e.g. 30s, 500ms). Runs until Ctrl-C otherwise.
    #[arg(long)]
    pub duration: Option<String>,
    /// Print received messages as well as link state changes.
    #[arg(long)]
    pub messages: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Compact frame as hex bytes (e.g. "DE 64 64 55 55 DE 55 55 55 01").
    #[arg(long, conflicts_with_all = ["msg_type", "json"])]
    pub hex: Option<String>,
    /// Extended message type, by name (TELEMETRY) or id (0x02).
    #[arg(long = "type", value_name = "TYPE", requires = "json")]
    pub msg_type: Option<String>,
    /// JSON payload for the extended message.
    #[arg(long, requires = "msg_type")]
    pub json: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up after this long without N messages (e.g. 10s).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
