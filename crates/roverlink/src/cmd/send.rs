use roverlink_frame::{decode_compact, type_name, CompactFrame, MessageType, Payload};
use roverlink_link::CommunicationManager;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{
    frame_error, link_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE,
};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.resolve()?;
    let request = resolve_request(&args)?;

    let manager =
        CommunicationManager::open(config).map_err(|err| link_error("open failed", err))?;
    let transport = manager.transport_name();

    let result = match request {
        Request::Compact(frame) => {
            debug!(kind = frame.kind.name(), "sending compact frame");
            manager.send_compact(frame.kind.id(), &frame.fields).map(|()| {
                let kind = frame.kind;
                print_sent("compact", kind.name(), kind.id(), None, transport, format)
            })
        }
        Request::Extended(payload) => manager.send_extended(&payload).map(|msg_id| {
            let type_id = payload.type_id();
            print_sent(
                "extended",
                &type_name(type_id),
                type_id,
                Some(msg_id),
                transport,
                format,
            )
        }),
    };
    manager.shutdown();
    result.map_err(|err| link_error("send failed", err))?;

    Ok(SUCCESS)
}

enum Request {
    Compact(CompactFrame),
    Extended(Payload),
}

fn resolve_request(args: &SendArgs) -> CliResult<Request> {
    if let Some(hex) = &args.hex {
        let bytes = parse_hex(hex)?;
        let frame = decode_compact(&bytes).map_err(|err| frame_error("invalid frame", err))?;
        if bytes.len() != frame.kind.frame_len() {
            return Err(CliError::new(
                DATA_INVALID,
                format!(
                    "{} frame is {} bytes, got {}",
                    frame.kind.name(),
                    frame.kind.frame_len(),
                    bytes.len()
                ),
            ));
        }
        return Ok(Request::Compact(frame));
    }
    match (&args.msg_type, &args.json) {
        (Some(ty), Some(json)) => {
            let type_id = parse_type(ty)?;
            let value: serde_json::Value = serde_json::from_str(json)
                .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
            Payload::from_json(type_id, &value)
                .map(Request::Extended)
                .map_err(|err| frame_error("invalid payload", err))
        }
        _ => Err(CliError::usage("either --hex or --type with --json is required")),
    }
}

/// Known type names, or any byte given as `0x..` or decimal.
fn parse_type(text: &str) -> CliResult<u8> {
    if let Some(ty) = MessageType::parse(text) {
        return Ok(ty.id());
    }
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => text.parse::<u8>().ok(),
    };
    parsed.ok_or_else(|| CliError::usage(format!("unknown message type: {text}")))
}

/// Hex bytes, optionally separated by whitespace, `:` or `,`.
fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if !digits.is_ascii() {
        return Err(CliError::usage("--hex must contain only hex digits"));
    }
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(CliError::usage(format!(
            "--hex needs an even number of hex digits, got {}",
            digits.len()
        )));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::usage(format!("invalid hex byte: {}", &digits[i..i + 2])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_separators() {
        assert_eq!(parse_hex("DE 64:64,55").unwrap(), vec![0xDE, 0x64, 0x64, 0x55]);
        assert_eq!(parse_hex("0xaa1234").unwrap(), vec![0xAA, 0x12, 0x34]);
    }

    #[test]
    fn parse_hex_rejects_odd_and_garbage() {
        assert_eq!(parse_hex("ABC").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("ZZ").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_type_by_name_or_number() {
        assert_eq!(parse_type("telemetry").unwrap(), 0x02);
        assert_eq!(parse_type("GPS-DATA").unwrap(), 0x12);
        assert_eq!(parse_type("0x30").unwrap(), 0x30);
        assert_eq!(parse_type("48").unwrap(), 0x30);
        assert!(parse_type("bogus").is_err());
    }
}
