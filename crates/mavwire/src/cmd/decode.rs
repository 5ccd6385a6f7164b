use mavwire_frame::{FrameError, ParseEvent};

use crate::cmd::{read_input, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = read_input(&args.input, args.hex)?;
    let mut reader = args.link.reader(capture)?;
    let mut printed = 0usize;

    loop {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }

        let event = match reader.read_event() {
            Ok(event) => event,
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("decode failed", err)),
        };

        if args.packets_only && !matches!(event, ParseEvent::Message(_)) {
            continue;
        }
        print_event(&event, format);
        printed = printed.saturating_add(1);
    }

    let stats = reader.parser().stats();
    if reader.parser().buf_len() > 0 {
        tracing::warn!(
            buffered = reader.parser().buf_len(),
            "capture ends inside a frame"
        );
    }
    tracing::info!(
        packets = stats.packets_received,
        errors = stats.receive_errors,
        dropped = stats.bytes_dropped,
        "decode finished"
    );
    Ok(SUCCESS)
}
