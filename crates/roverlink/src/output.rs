use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use roverlink_frame::{CompactFrame, FieldValue};
use roverlink_link::{LinkStats, LinkTransition, Message};
use roverlink_transport::ProbeReport;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput {
    event: &'static str,
    protocol: &'static str,
    name: String,
    type_id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_ms: Option<u64>,
    body: Value,
    received_at: String,
}

impl MessageOutput {
    fn new(message: &Message) -> Self {
        let (protocol, type_id, msg_id, timestamp_ms, body) = match message {
            Message::Compact(frame) => (
                "compact",
                frame.kind.id(),
                None,
                None,
                compact_fields(frame),
            ),
            Message::Extended(msg) => (
                "extended",
                msg.type_id(),
                Some(msg.msg_id),
                Some(msg.timestamp_ms),
                msg.payload.to_json(),
            ),
        };
        Self {
            event: "message",
            protocol,
            name: message.name(),
            type_id,
            msg_id,
            timestamp_ms,
            body,
            received_at: now_unix_seconds(),
        }
    }
}

pub fn print_message(message: &Message, format: OutputFormat) {
    let out = MessageOutput::new(message);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "PROTOCOL", "MSG ID", "BODY"])
                .add_row(vec![
                    format!("{} (0x{:02X})", out.name, out.type_id),
                    out.protocol.to_string(),
                    out.msg_id.map(|id| id.to_string()).unwrap_or_default(),
                    out.body.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match out.msg_id {
            Some(id) => println!(
                "{} id={} ts={} {}",
                out.name,
                id,
                out.timestamp_ms.unwrap_or(0),
                out.body
            ),
            None => println!("{} {}", out.name, out.body),
        },
        OutputFormat::Raw => println!("{}", out.body),
    }
}

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'static str,
    protocol: &'static str,
    name: &'a str,
    type_id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg_id: Option<u32>,
    transport: &'static str,
}

pub fn print_sent(
    protocol: &'static str,
    name: &str,
    type_id: u8,
    msg_id: Option<u32>,
    transport: &'static str,
    format: OutputFormat,
) {
    let out = SentOutput {
        event: "sent",
        protocol,
        name,
        type_id,
        msg_id,
        transport,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => match msg_id {
            Some(id) => println!("sent {name} (0x{type_id:02X}) id={id} via {transport}"),
            None => println!("sent {name} (0x{type_id:02X}) via {transport}"),
        },
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct TransitionOutput {
    event: &'static str,
    from: &'static str,
    to: &'static str,
    silence_ms: Option<u64>,
}

pub fn print_transition(transition: &LinkTransition, format: OutputFormat) {
    let out = TransitionOutput {
        event: "link_state",
        from: transition.from.as_str(),
        to: transition.to.as_str(),
        silence_ms: transition.silence.map(|d| d.as_millis() as u64),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let silence = out
                .silence_ms
                .map(|ms| format!(" after {ms}ms silence"))
                .unwrap_or_default();
            println!("link {} -> {}{}", out.from, out.to, silence);
        }
        OutputFormat::Raw => println!("{}", out.to),
    }
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    transports: &'a [ProbeReport],
    serial_ports: &'a [String],
}

pub fn print_probe(reports: &[ProbeReport], serial_ports: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ProbeOutput {
            transports: reports,
            serial_ports,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TRANSPORT", "TARGET", "AVAILABLE", "DETAIL"]);
            for report in reports {
                table.add_row(vec![
                    report.transport.to_string(),
                    report.target.clone(),
                    yes_no(report.available).to_string(),
                    report.detail.clone(),
                ]);
            }
            println!("{table}");
            if !serial_ports.is_empty() {
                println!("serial ports: {}", serial_ports.join(", "));
            }
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for report in reports {
                println!(
                    "{} {} available={} ({})",
                    report.transport,
                    report.target,
                    yes_no(report.available),
                    report.detail
                );
            }
            for port in serial_ports {
                println!("serial {port}");
            }
        }
    }
}

pub fn print_stats(stats: &LinkStats, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(stats),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["COUNTER", "VALUE"])
                .add_row(vec!["frames sent".to_string(), stats.frames_sent.to_string()])
                .add_row(vec![
                    "frames received".to_string(),
                    stats.frames_received.to_string(),
                ])
                .add_row(vec![
                    "frames dropped".to_string(),
                    stats.frames_dropped.to_string(),
                ])
                .add_row(vec![
                    "duplicates dropped".to_string(),
                    stats.duplicates_dropped.to_string(),
                ])
                .add_row(vec![
                    "heartbeats sent".to_string(),
                    stats.heartbeats_sent.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent={} received={} dropped={} duplicates={} heartbeats={}",
                stats.frames_sent,
                stats.frames_received,
                stats.frames_dropped,
                stats.duplicates_dropped,
                stats.heartbeats_sent
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn compact_fields(frame: &CompactFrame) -> Value {
    Value::Array(
        frame
            .fields
            .iter()
            .map(|field| match field {
                FieldValue::Uint(v) => Value::from(*v),
                FieldValue::Float(v) => Value::from(f64::from(*v)),
                FieldValue::Flags(bits) => Value::from(bits.to_vec()),
            })
            .collect(),
    )
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use roverlink_frame::{ExtendedMessage, HeartbeatPayload, Payload};

    use super::*;

    #[test]
    fn compact_message_output_lists_fields() {
        let out = MessageOutput::new(&Message::Compact(CompactFrame::quit()));
        assert_eq!(out.protocol, "compact");
        assert_eq!(out.type_id, 0xFE);
        assert!(out.msg_id.is_none());
        assert!(out.body.is_array());
    }

    #[test]
    fn extended_message_output_carries_id_and_payload() {
        let msg = ExtendedMessage::new(7, 1_000, Payload::Heartbeat(HeartbeatPayload::default()));
        let out = MessageOutput::new(&Message::Extended(msg));
        assert_eq!(out.name, "HEARTBEAT");
        assert_eq!(out.msg_id, Some(7));
        assert_eq!(out.body["status"], "alive");
    }
}
