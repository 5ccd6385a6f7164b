use bytes::BufMut;

use crate::error::FramingError;

/// Start marker of a legacy (v1) frame.
pub const STX_V1: u8 = 0xFE;

/// Start marker of an extended (v2) frame.
pub const STX_V2: u8 = 0xFD;

/// Legacy header length, start marker included.
pub const HEADER_LEN_V1: usize = 6;

/// Extended header length, start marker included.
pub const HEADER_LEN_V2: usize = 10;

pub const CHECKSUM_LEN: usize = 2;

/// Link id (1) + timestamp (6) + tag (6).
pub const SIGNATURE_LEN: usize = 13;

/// Incompatibility flag: the frame carries a signature block.
pub const IFLAG_SIGNED: u8 = 0x01;

/// Every incompatibility flag this implementation understands.
pub const SUPPORTED_INCOMPAT_FLAGS: u8 = IFLAG_SIGNED;

/// Largest possible frame on the wire.
pub const MAX_FRAME_LEN: usize = HEADER_LEN_V2 + 255 + CHECKSUM_LEN + SIGNATURE_LEN;

/// Header format of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Legacy header, 8-bit message ids, no signing.
    V1,
    /// Extended header, 24-bit message ids, payload trimming and signing.
    V2,
}

impl ProtocolVersion {
    pub const fn from_stx(byte: u8) -> Option<Self> {
        match byte {
            STX_V1 => Some(ProtocolVersion::V1),
            STX_V2 => Some(ProtocolVersion::V2),
            _ => None,
        }
    }

    pub const fn stx(self) -> u8 {
        match self {
            ProtocolVersion::V1 => STX_V1,
            ProtocolVersion::V2 => STX_V2,
        }
    }

    pub const fn header_len(self) -> usize {
        match self {
            ProtocolVersion::V1 => HEADER_LEN_V1,
            ProtocolVersion::V2 => HEADER_LEN_V2,
        }
    }
}

/// The caller-controlled parts of an outgoing header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    /// Compatibility flags. Receivers ignore bits they do not know.
    pub compat_flags: u8,
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: ProtocolVersion,
    /// Payload bytes actually on the wire.
    pub payload_len: u8,
    pub incompat_flags: u8,
    pub compat_flags: u8,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u32,
}

impl Header {
    pub fn is_signed(&self) -> bool {
        self.version == ProtocolVersion::V2 && self.incompat_flags & IFLAG_SIGNED != 0
    }

    pub fn header_len(&self) -> usize {
        self.version.header_len()
    }

    /// Total frame length implied by this header, signature included.
    pub fn frame_len(&self) -> usize {
        let signature = if self.is_signed() { SIGNATURE_LEN } else { 0 };
        self.header_len() + usize::from(self.payload_len) + CHECKSUM_LEN + signature
    }

    /// Offset of the checksum within the frame.
    pub fn checksum_offset(&self) -> usize {
        self.header_len() + usize::from(self.payload_len)
    }

    /// Write the header, start marker first.
    ///
    /// A legacy header keeps only the low byte of the message id; callers
    /// check the range beforehand.
    pub fn write(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.version.stx());
        dst.put_u8(self.payload_len);
        match self.version {
            ProtocolVersion::V1 => {
                dst.put_u8(self.sequence);
                dst.put_u8(self.system_id);
                dst.put_u8(self.component_id);
                dst.put_u8(self.message_id as u8);
            }
            ProtocolVersion::V2 => {
                dst.put_u8(self.incompat_flags);
                dst.put_u8(self.compat_flags);
                dst.put_u8(self.sequence);
                dst.put_u8(self.system_id);
                dst.put_u8(self.component_id);
                dst.put_slice(&self.message_id.to_le_bytes()[..3]);
            }
        }
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Returns `Ok(None)` until the whole header is present. Unsupported
    /// incompatibility flags are reported as soon as the flags byte arrives.
    pub fn parse(bytes: &[u8]) -> Result<Option<Header>, FramingError> {
        let Some(&stx) = bytes.first() else {
            return Ok(None);
        };
        let version = ProtocolVersion::from_stx(stx).ok_or(FramingError::BadMarker(stx))?;

        if version == ProtocolVersion::V2 {
            if let Some(&flags) = bytes.get(2) {
                if flags & !SUPPORTED_INCOMPAT_FLAGS != 0 {
                    return Err(FramingError::UnsupportedFlags(flags));
                }
            }
        }

        if bytes.len() < version.header_len() {
            return Ok(None);
        }

        let header = match version {
            ProtocolVersion::V1 => Header {
                version,
                payload_len: bytes[1],
                incompat_flags: 0,
                compat_flags: 0,
                sequence: bytes[2],
                system_id: bytes[3],
                component_id: bytes[4],
                message_id: u32::from(bytes[5]),
            },
            ProtocolVersion::V2 => Header {
                version,
                payload_len: bytes[1],
                incompat_flags: bytes[2],
                compat_flags: bytes[3],
                sequence: bytes[4],
                system_id: bytes[5],
                component_id: bytes[6],
                message_id: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], 0]),
            },
        };
        Ok(Some(header))
    }
}
