use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cmd::ListenArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Largest datagram a UDP socket can deliver.
const DATAGRAM_LEN: usize = 65_535;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut link = args.link.open()?;
    let socket = UdpSocket::bind(&args.bind)
        .map_err(|err| io_error(&format!("bind {} failed", args.bind), err))?;
    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|err| io_error("socket setup failed", err))?;
    if let Ok(addr) = socket.local_addr() {
        tracing::info!(%addr, dialect = link.dialect().name(), "listening");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut datagram = vec![0u8; DATAGRAM_LEN];
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut datagram) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("receive failed", err)),
        };
        tracing::trace!(%peer, len, "datagram");

        for event in link.parse_buffer(&datagram[..len]) {
            print_event(&event, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    let stats = link.stats();
    tracing::info!(
        packets = stats.packets_received,
        errors = stats.receive_errors,
        "listener stopped"
    );
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
