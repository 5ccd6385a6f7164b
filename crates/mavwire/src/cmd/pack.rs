use std::net::UdpSocket;
use std::sync::Arc;

use mavwire_registry::{Dialect, Message, MessageDescriptor, Value};
use serde::Serialize;

use crate::cmd::PackArgs;
use crate::exit::{io_error, link_error, registry_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct PackOutput<'a> {
    message: &'a str,
    msgid: u32,
    seq: u8,
    len: usize,
    frame: String,
    sent_to: Option<&'a str>,
}

pub fn run(args: PackArgs, format: OutputFormat) -> CliResult<i32> {
    let mut link = args.link.open()?;
    let descriptor = resolve_message(link.dialect(), &args.message)?;
    let fields: serde_json::Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("invalid --json: {err}")))?;
    let message = message_from_json(descriptor, &fields)?;

    link.set_sequence(args.seq);
    let frame = link
        .pack(&message)
        .map_err(|err| link_error("pack failed", err))?;

    if let Some(addr) = &args.to {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|err| io_error("bind failed", err))?;
        socket
            .send_to(&frame, addr.as_str())
            .map_err(|err| io_error(&format!("send to {addr} failed"), err))?;
        tracing::info!(to = %addr, len = frame.len(), "frame sent");
    }

    let out = PackOutput {
        message: message.name(),
        msgid: message.id(),
        seq: args.seq,
        len: frame.len(),
        frame: hex::encode(&frame),
        sent_to: args.to.as_deref(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            vec!["MESSAGE", "ID", "SEQ", "LEN", "FRAME"],
            vec![vec![
                out.message.to_string(),
                out.msgid.to_string(),
                out.seq.to_string(),
                out.len.to_string(),
                out.frame.clone(),
            ]],
        ),
        OutputFormat::Pretty | OutputFormat::Raw => println!("{}", out.frame),
    }
    Ok(SUCCESS)
}

/// Look a message up by name, or by numeric id when the argument parses as one.
fn resolve_message(dialect: &Dialect, key: &str) -> CliResult<Arc<MessageDescriptor>> {
    let found = match key.parse::<u32>() {
        Ok(id) => dialect.message(id),
        Err(_) => dialect.message(key),
    };
    found.map_err(|err| registry_error("message lookup failed", err))
}

fn message_from_json(
    descriptor: Arc<MessageDescriptor>,
    fields: &serde_json::Value,
) -> CliResult<Message> {
    let serde_json::Value::Object(fields) = fields else {
        return Err(CliError::new(USAGE, "--json must be an object"));
    };

    let mut message = Message::new(descriptor);
    for (name, raw) in fields {
        let value = json_to_value(raw).ok_or_else(|| {
            CliError::new(USAGE, format!("field {name}: unsupported JSON value {raw}"))
        })?;
        message
            .set(name, value)
            .map_err(|err| registry_error("invalid field", err))?;
    }
    Ok(message)
}

fn json_to_value(raw: &serde_json::Value) -> Option<Value> {
    match raw {
        serde_json::Value::Bool(flag) => Some(Value::U8(u8::from(*flag))),
        serde_json::Value::Number(number) => {
            if let Some(v) = number.as_u64() {
                Some(Value::U64(v))
            } else if let Some(v) = number.as_i64() {
                Some(Value::I64(v))
            } else {
                number.as_f64().map(Value::F64)
            }
        }
        serde_json::Value::String(text) => Some(Value::Text(text.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_to_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}
