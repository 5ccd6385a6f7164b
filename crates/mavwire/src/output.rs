use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mavwire_frame::{BadData, Packet, ParseEvent, UnknownPacket};
use serde::Serialize;

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
#[serde(tag = "kind", rename_all = "snake_case")]
enum EventOutput<'a> {
    Message {
        name: &'a str,
        msgid: u32,
        seq: u8,
        sysid: u8,
        compid: u8,
        signed: bool,
        link_id: Option<u8>,
        fields: serde_json::Value,
    },
    Unknown {
        msgid: u32,
        seq: u8,
        sysid: u8,
        compid: u8,
        payload: String,
    },
    BadData {
        error: String,
        bytes: String,
    },
}

impl<'a> From<&'a ParseEvent> for EventOutput<'a> {
    fn from(event: &'a ParseEvent) -> Self {
        match event {
            ParseEvent::Message(packet) => EventOutput::Message {
                name: packet.name(),
                msgid: packet.message_id(),
                seq: packet.header.sequence,
                sysid: packet.header.system_id,
                compid: packet.header.component_id,
                signed: packet.header.is_signed(),
                link_id: packet.signature.map(|s| s.link_id),
                fields: packet.message.to_json(),
            },
            ParseEvent::Unknown(unknown) => EventOutput::Unknown {
                msgid: unknown.header.message_id,
                seq: unknown.header.sequence,
                sysid: unknown.header.system_id,
                compid: unknown.header.component_id,
                payload: hex::encode(&unknown.payload),
            },
            ParseEvent::Bad(bad) => EventOutput::BadData {
                error: bad.error.to_string(),
                bytes: hex::encode(&bad.bytes),
            },
        }
    }
}

pub fn print_event(event: &ParseEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput::from(event);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "ID", "SEQ", "SOURCE", "CONTENT"])
                .add_row(table_row(event));
            println!("{table}");
        }
        OutputFormat::Pretty => match event {
            ParseEvent::Message(packet) => println!("{}", pretty_packet(packet)),
            ParseEvent::Unknown(unknown) => println!("{}", pretty_unknown(unknown)),
            ParseEvent::Bad(bad) => println!("{}", pretty_bad(bad)),
        },
        OutputFormat::Raw => println!("{}", hex::encode(raw_bytes(event))),
    }
}

pub fn print_table(header: Vec<&str>, rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table_row(event: &ParseEvent) -> Vec<String> {
    match event {
        ParseEvent::Message(packet) => vec![
            packet.name().to_string(),
            packet.message_id().to_string(),
            packet.header.sequence.to_string(),
            format!("{}/{}", packet.header.system_id, packet.header.component_id),
            field_summary(packet),
        ],
        ParseEvent::Unknown(unknown) => vec![
            "UNKNOWN".to_string(),
            unknown.header.message_id.to_string(),
            unknown.header.sequence.to_string(),
            format!("{}/{}", unknown.header.system_id, unknown.header.component_id),
            hex::encode(&unknown.payload),
        ],
        ParseEvent::Bad(bad) => vec![
            "BAD_DATA".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            bad.error.to_string(),
        ],
    }
}

fn field_summary(packet: &Packet) -> String {
    packet
        .message
        .fields()
        .map(|(name, value)| {
            let value = serde_json::to_string(value).unwrap_or_default();
            format!("{name}={value}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn pretty_packet(packet: &Packet) -> String {
    let signed = match packet.signature {
        Some(signature) => format!(" signed(link={})", signature.link_id),
        None => String::new(),
    };
    format!(
        "{} seq={} src={}/{}{} {{{}}}",
        packet.name(),
        packet.header.sequence,
        packet.header.system_id,
        packet.header.component_id,
        signed,
        field_summary(packet)
    )
}

fn pretty_unknown(unknown: &UnknownPacket) -> String {
    format!(
        "UNKNOWN_{} seq={} src={}/{} payload={}",
        unknown.header.message_id,
        unknown.header.sequence,
        unknown.header.system_id,
        unknown.header.component_id,
        hex::encode(&unknown.payload)
    )
}

fn pretty_bad(bad: &BadData) -> String {
    format!("BAD_DATA {} bytes={}", bad.error, hex::encode(&bad.bytes))
}

fn raw_bytes(event: &ParseEvent) -> &[u8] {
    match event {
        ParseEvent::Message(packet) => &packet.raw,
        ParseEvent::Unknown(unknown) => &unknown.raw,
        ParseEvent::Bad(bad) => &bad.bytes,
    }
}
