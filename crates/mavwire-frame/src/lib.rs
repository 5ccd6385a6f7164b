//! MAVLink v1/v2 framing, packet signing and stream parsing.
//!
//! Every frame on the wire is laid out as:
//! - A start marker (`0xFE` legacy, `0xFD` extended) and header
//! - The payload, with trailing zero bytes trimmed on extended frames
//! - A little-endian CRC-16/MCRF4XX seeded with the message's `crc_extra`
//! - On signed extended frames, a 13-byte signature block
//!
//! [`FrameParser`] turns an arbitrary byte stream into packets and
//! diagnostics without ever stalling on garbage. [`FrameReader`] and
//! [`FrameWriter`] wrap blocking streams.

pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod parser;
pub mod reader;
pub mod signing;
pub mod writer;

pub use codec::{pack, trimmed_len, unpack, Packet, UnknownPacket};
pub use config::{FrameConfig, DEFAULT_READ_CHUNK_SIZE};
pub use error::{
    DecodeError, FrameError, FramingError, KeyError, PackError, Result, SignatureFailure,
};
pub use header::{
    Header, HeaderFields, ProtocolVersion, CHECKSUM_LEN, HEADER_LEN_V1, HEADER_LEN_V2,
    IFLAG_SIGNED, MAX_FRAME_LEN, SIGNATURE_LEN, STX_V1, STX_V2,
};
pub use parser::{BadData, FrameParser, ParseEvent, ParserConfig, ParserState, ParserStats};
pub use reader::FrameReader;
pub use signing::{
    compute_tag, AllowUnsigned, SecretKey, Signature, SigningConfig, SigningContext,
    SigningCounters, SigningTimestamp, DEFAULT_NEW_STREAM_WINDOW, SIGNING_EPOCH_UNIX_SECS,
};
pub use writer::FrameWriter;
