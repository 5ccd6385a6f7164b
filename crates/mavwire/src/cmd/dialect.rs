use mavwire_registry::{Dialect, MessageDescriptor};
use serde::Serialize;

use crate::cmd::DialectArgs;
use crate::exit::{registry_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
struct MessageSummary<'a> {
    id: u32,
    name: &'a str,
    crc_extra: u8,
    min_len: usize,
    max_len: usize,
}

#[derive(Debug, Serialize)]
struct FieldLayout<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    ty: String,
    offset: usize,
    len: usize,
    extension: bool,
}

pub fn run(args: DialectArgs, format: OutputFormat) -> CliResult<i32> {
    let dialect = args.source.load()?;
    match &args.message {
        Some(name) => {
            let descriptor = dialect
                .message(name.as_str())
                .map_err(|err| registry_error("message lookup failed", err))?;
            print_layout(&descriptor, format);
        }
        None => print_messages(&dialect, format),
    }
    Ok(SUCCESS)
}

fn summaries(dialect: &Dialect) -> Vec<MessageSummary<'_>> {
    let mut out: Vec<MessageSummary<'_>> = dialect
        .messages()
        .map(|descriptor| MessageSummary {
            id: descriptor.id(),
            name: descriptor.name(),
            crc_extra: descriptor.crc_extra(),
            min_len: descriptor.base_len(),
            max_len: descriptor.encoded_len(),
        })
        .collect();
    out.sort_by_key(|summary| summary.id);
    out
}

/// Fields in wire order with their payload offsets.
fn layout(descriptor: &MessageDescriptor) -> Vec<FieldLayout<'_>> {
    descriptor
        .fields()
        .iter()
        .map(|field| FieldLayout {
            name: &field.name,
            ty: field.type_name(),
            offset: field.offset,
            len: field.wire_len(),
            extension: field.extension,
        })
        .collect()
}

fn print_messages(dialect: &Dialect, format: OutputFormat) {
    let rows = summaries(dialect);
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table | OutputFormat::Pretty => print_table(
            vec!["ID", "NAME", "CRC_EXTRA", "MIN_LEN", "MAX_LEN"],
            rows.iter()
                .map(|row| {
                    vec![
                        row.id.to_string(),
                        row.name.to_string(),
                        row.crc_extra.to_string(),
                        row.min_len.to_string(),
                        row.max_len.to_string(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Raw => {
            for row in rows {
                println!("{}", row.name);
            }
        }
    }
}

fn print_layout(descriptor: &MessageDescriptor, format: OutputFormat) {
    let fields = layout(descriptor);
    match format {
        OutputFormat::Json => print_json(&fields),
        OutputFormat::Table | OutputFormat::Pretty => print_table(
            vec!["FIELD", "TYPE", "OFFSET", "LEN", "EXTENSION"],
            fields
                .iter()
                .map(|field| {
                    vec![
                        field.name.to_string(),
                        field.ty.clone(),
                        field.offset.to_string(),
                        field.len.to_string(),
                        field.extension.to_string(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Raw => {
            for field in fields {
                println!("{} {}", field.name, field.ty);
            }
        }
    }
}
