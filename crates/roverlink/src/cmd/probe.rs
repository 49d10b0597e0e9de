use roverlink_transport::{list_serial_ports, probe, TransportConfig};

use crate::cmd::ProbeArgs;
use crate::exit::{CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_probe, OutputFormat};

/// Exits 0 when the link could come up, on the primary or the fallback.
pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.resolve()?;

    let mut reports = vec![probe(&config.transport)];
    if let Some(fallback) = &config.fallback {
        reports.push(probe(&TransportConfig::Simulated(fallback.clone())));
    }
    let ports = list_serial_ports();
    print_probe(&reports, &ports, format);

    if reports.iter().any(|report| report.available) {
        Ok(SUCCESS)
    } else {
        Ok(TRANSPORT_ERROR)
    }
}
