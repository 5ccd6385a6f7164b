/// Structural problems with a candidate frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// The first byte is not a start marker.
    #[error("invalid start marker 0x{0:02x}")]
    BadMarker(u8),

    /// The frame sets incompatibility flags this implementation cannot handle.
    #[error("unsupported incompatibility flags 0x{0:02x}")]
    UnsupportedFlags(u8),

    /// Not even a complete header is present.
    #[error("frame truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    /// The declared payload length disagrees with the bytes present.
    #[error("declared payload length {declared}, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Reasons a signature check refused a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureFailure {
    /// Timestamp not newer than the last one accepted for this stream.
    #[error("replayed timestamp {timestamp} (last accepted {last})")]
    Replay { timestamp: u64, last: u64 },

    /// First timestamp of a new stream is too far behind the local clock.
    #[error("timestamp {timestamp} too old for a new stream")]
    StaleStream { timestamp: u64 },

    /// The tag does not match the frame contents.
    #[error("signature tag mismatch")]
    BadTag,

    /// Unsigned frame refused by the allow-unsigned policy.
    #[error("unsigned frame not accepted")]
    Unsigned,
}

/// Per-frame decode failures. None of them stop a parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// No descriptor for this message id in the active dialect.
    #[error("unknown message id {0}")]
    UnknownMessage(u32),

    #[error("checksum mismatch for message {message_id}: expected 0x{expected:04x}, received 0x{received:04x}")]
    ChecksumMismatch {
        message_id: u32,
        expected: u16,
        received: u16,
    },

    #[error("signature rejected: {0}")]
    SignatureRejected(#[from] SignatureFailure),
}

/// Packing failures. These indicate a caller error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    /// Legacy headers only carry 8-bit message ids.
    #[error("message id {0} does not fit a legacy header")]
    LegacyMessageId(u32),
}

/// Invalid signing key material.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyError {
    #[error("secret key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("secret key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors raised by the blocking frame reader and writer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Pack(#[from] PackError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
