use std::collections::HashMap;
use std::time::{Duration, Instant};

use mavwire_frame::{FrameError, ParseEvent};
use serde::Serialize;

use crate::cmd::{read_input, StatsArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Debug, Default, Serialize)]
struct CaptureStats {
    bytes: usize,
    packets: u64,
    unknown: u64,
    bad_data: u64,
    bytes_dropped: u64,
    duration_secs: f64,
    packets_per_second: f64,
    by_type: Vec<TypeCount>,
}

#[derive(Debug, Serialize, PartialEq)]
struct TypeCount {
    name: String,
    count: u64,
}

pub fn run(args: StatsArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = read_input(&args.input, args.hex)?;
    let bytes = capture.len();
    let mut reader = args.link.reader(capture)?;

    let mut tally = Tally::default();
    let start = Instant::now();
    loop {
        match reader.read_event() {
            Ok(event) => tally.record(&event),
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("parse failed", err)),
        }
    }
    let elapsed = start.elapsed();

    let mut stats = tally.finish(elapsed);
    stats.bytes = bytes;
    stats.bytes_dropped = reader.parser().stats().bytes_dropped;
    print_stats(&stats, format);
    Ok(SUCCESS)
}

#[derive(Debug, Default)]
struct Tally {
    by_type: HashMap<String, u64>,
    unknown: u64,
    bad_data: u64,
}

impl Tally {
    fn record(&mut self, event: &ParseEvent) {
        match event {
            ParseEvent::Message(packet) => {
                *self.by_type.entry(packet.name().to_string()).or_default() += 1;
            }
            ParseEvent::Unknown(_) => self.unknown += 1,
            ParseEvent::Bad(_) => self.bad_data += 1,
        }
    }

    fn finish(self, elapsed: Duration) -> CaptureStats {
        let mut by_type: Vec<TypeCount> = self
            .by_type
            .into_iter()
            .map(|(name, count)| TypeCount { name, count })
            .collect();
        // Busiest first; ties by name so output is stable.
        by_type.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        let packets = by_type.iter().map(|entry| entry.count).sum::<u64>();
        let duration_secs = elapsed.as_secs_f64();
        let packets_per_second = if duration_secs > 0.0 {
            packets as f64 / duration_secs
        } else {
            0.0
        };

        CaptureStats {
            packets,
            unknown: self.unknown,
            bad_data: self.bad_data,
            duration_secs,
            packets_per_second,
            by_type,
            ..CaptureStats::default()
        }
    }
}

fn print_stats(stats: &CaptureStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(stats),
        OutputFormat::Table => {
            print_table(
                vec!["BYTES", "PACKETS", "UNKNOWN", "BAD DATA", "DROPPED", "PPS"],
                vec![vec![
                    stats.bytes.to_string(),
                    stats.packets.to_string(),
                    stats.unknown.to_string(),
                    stats.bad_data.to_string(),
                    stats.bytes_dropped.to_string(),
                    format!("{:.2}", stats.packets_per_second),
                ]],
            );
            print_table(
                vec!["TYPE", "COUNT"],
                stats
                    .by_type
                    .iter()
                    .map(|entry| vec![entry.name.clone(), entry.count.to_string()])
                    .collect(),
            );
        }
        OutputFormat::Pretty => {
            println!(
                "Parsed {} packets from {} bytes in {:.6} seconds.",
                stats.packets, stats.bytes, stats.duration_secs
            );
            println!("Packets per second: {:.2} pps.", stats.packets_per_second);
            if stats.unknown > 0 || stats.bad_data > 0 {
                println!(
                    "Skipped {} unknown and {} bad frames.",
                    stats.unknown, stats.bad_data
                );
            }
            for entry in &stats.by_type {
                println!("{} {}", entry.name, entry.count);
            }
        }
        OutputFormat::Raw => {
            for entry in &stats.by_type {
                println!("{} {}", entry.name, entry.count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use mavwire_frame::{BadData, DecodeError, FramingError};

    use super::*;

    fn bad() -> ParseEvent {
        ParseEvent::Bad(BadData {
            bytes: Bytes::from_static(&[0xFD]),
            error: DecodeError::Framing(FramingError::BadMarker(0xFD)),
        })
    }

    #[test]
    fn tally_orders_by_count_then_name() {
        let mut tally = Tally::default();
        tally.by_type.insert("PING".to_string(), 2);
        tally.by_type.insert("HEARTBEAT".to_string(), 5);
        tally.by_type.insert("ATTITUDE".to_string(), 2);
        tally.record(&bad());

        let stats = tally.finish(Duration::from_millis(500));
        let names: Vec<&str> = stats.by_type.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["HEARTBEAT", "ATTITUDE", "PING"]);
        assert_eq!(stats.packets, 9);
        assert_eq!(stats.bad_data, 1);
        assert!((stats.packets_per_second - 18.0).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_reports_zero_rate() {
        let stats = Tally::default().finish(Duration::ZERO);
        assert_eq!(stats.packets, 0);
        assert_eq!(stats.packets_per_second, 0.0);
    }
}
