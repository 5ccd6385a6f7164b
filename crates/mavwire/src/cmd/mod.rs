use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Subcommand};
use mavwire_frame::{
    FrameConfig, FrameReader, Header, ParserConfig, SecretKey, SigningConfig, SigningContext,
};
use mavwire_link::{Link, LinkConfig};
use mavwire_registry::{Dialect, Registry};

use crate::exit::{io_error, link_error, registry_error, CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod decode;
pub mod dialect;
pub mod listen;
pub mod pack;
pub mod stats;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a capture and print every packet.
    Decode(DecodeArgs),
    /// Parse a capture and count packets by type.
    Stats(StatsArgs),
    /// Listen on a UDP socket and print received packets.
    Listen(ListenArgs),
    /// Encode one message and print or send the frame.
    Pack(PackArgs),
    /// List the messages of a dialect, or the fields of one message.
    Dialect(DialectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Stats(args) => stats::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Pack(args) => pack::run(args, format),
        Command::Dialect(args) => dialect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct DialectSource {
    /// Dialect to speak.
    #[arg(long, default_value = "common")]
    pub dialect: String,
    /// Load dialects from a directory of *.dialect.json files instead of the
    /// built-in set.
    #[arg(long, value_name = "DIR")]
    pub dialects_dir: Option<PathBuf>,
}

impl DialectSource {
    pub fn load(&self) -> CliResult<Arc<Dialect>> {
        let registry = match &self.dialects_dir {
            Some(dir) => Registry::from_directory(dir),
            None => Registry::builtin(),
        }
        .map_err(|err| registry_error("loading dialects failed", err))?;
        registry
            .dialect(&self.dialect)
            .map_err(|err| registry_error("dialect lookup failed", err))
    }
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[command(flatten)]
    pub source: DialectSource,
    /// Secret signing key as 64 hex digits.
    #[arg(long, short = 'S', value_name = "HEX", env = "MAVWIRE_SIGNING_KEY")]
    pub signing_key: Option<String>,
    /// Accept unsigned packets while a signing key is set.
    #[arg(long)]
    pub allow_unsigned: bool,
    /// Report every skipped byte as bad data.
    #[arg(long)]
    pub robust: bool,
    /// Source system id for outgoing frames.
    #[arg(long, default_value = "255")]
    pub system_id: u8,
    /// Source component id for outgoing frames.
    #[arg(long, default_value = "190")]
    pub component_id: u8,
    /// Send legacy (v1) frames.
    #[arg(long)]
    pub legacy: bool,
}

impl LinkArgs {
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            robust_parsing: self.robust,
            ..ParserConfig::default()
        }
    }

    pub fn signing_context(&self) -> CliResult<Option<SigningContext>> {
        let Some(hex) = &self.signing_key else {
            return Ok(None);
        };
        let key = SecretKey::from_hex(hex)
            .map_err(|err| link_error("invalid signing key", err.into()))?;
        let mut context = SigningContext::new(SigningConfig::with_key(key));
        if self.allow_unsigned {
            context.set_allow_unsigned(Some(Arc::new(|_: &Header| true)));
        }
        Ok(Some(context))
    }

    pub fn open(&self) -> CliResult<Link> {
        let config = LinkConfig {
            system_id: self.system_id,
            component_id: self.component_id,
            force_legacy: self.legacy,
            parser: self.parser_config(),
            signing: None,
        };
        let mut link = Link::new(self.source.load()?, config);
        link.set_signing(self.signing_context()?);
        Ok(link)
    }

    /// Blocking frame reader over an in-memory capture.
    pub fn reader(&self, capture: Vec<u8>) -> CliResult<FrameReader<Cursor<Vec<u8>>>> {
        let config = FrameConfig {
            parser: self.parser_config(),
            ..FrameConfig::default()
        };
        let reader = FrameReader::with_config(Cursor::new(capture), self.source.load()?, config);
        Ok(match self.signing_context()? {
            Some(signing) => reader.with_signing(signing),
            None => reader,
        })
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file of raw MAVLink bytes, or `-` for stdin.
    pub input: PathBuf,
    /// Treat the input as hex text.
    #[arg(long)]
    pub hex: bool,
    /// Stop after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print packets only, skipping bad data and unknown messages.
    #[arg(long)]
    pub packets_only: bool,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Capture file of raw MAVLink bytes, or `-` for stdin.
    pub input: PathBuf,
    /// Treat the input as hex text.
    #[arg(long)]
    pub hex: bool,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local UDP address to bind.
    #[arg(default_value = "0.0.0.0:14550")]
    pub bind: String,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Message name or numeric id.
    pub message: String,
    /// Field values as a JSON object.
    #[arg(long, default_value = "{}")]
    pub json: String,
    /// Sequence number of the frame.
    #[arg(long, default_value = "0")]
    pub seq: u8,
    /// Send the frame as one UDP datagram to this address.
    #[arg(long, value_name = "ADDR")]
    pub to: Option<String>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct DialectArgs {
    #[command(flatten)]
    pub source: DialectSource,
    /// Show the wire layout of one message.
    #[arg(long, value_name = "NAME")]
    pub message: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Read a whole capture from a file or stdin.
pub fn read_input(path: &Path, hex: bool) -> CliResult<Vec<u8>> {
    let mut data = Vec::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_end(&mut data)
            .map_err(|err| io_error("reading stdin failed", err))?;
    } else {
        data = std::fs::read(path)
            .map_err(|err| io_error(&format!("reading {} failed", path.display()), err))?;
    }

    if !hex {
        return Ok(data);
    }
    let text: String = String::from_utf8_lossy(&data)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    hex::decode(text)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))
}
