use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use mavwire_checksum::frame_checksum;
use mavwire_registry::{Dialect, Message, MAX_PAYLOAD_LEN};

use crate::error::{DecodeError, FramingError, PackError};
use crate::header::{
    Header, HeaderFields, ProtocolVersion, CHECKSUM_LEN, IFLAG_SIGNED, SIGNATURE_LEN,
};
use crate::signing::{Signature, SigningContext};

/// A verified, decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub message: Message,
    pub checksum: u16,
    pub signature: Option<Signature>,
    /// The frame exactly as received.
    pub raw: Bytes,
}

impl Packet {
    pub fn message_id(&self) -> u32 {
        self.header.message_id
    }

    pub fn name(&self) -> &str {
        self.message.name()
    }
}

/// A well-formed frame whose message id the dialect does not define.
///
/// The checksum could not be verified without a `crc_extra` seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPacket {
    pub header: Header,
    pub payload: Bytes,
    pub checksum: u16,
    pub signature: Option<Signature>,
    pub raw: Bytes,
}

/// Length of `payload` with trailing zero bytes removed, keeping at least one.
pub fn trimmed_len(payload: &[u8]) -> usize {
    let mut len = payload.len();
    while len > 1 && payload[len - 1] == 0 {
        len -= 1;
    }
    len
}

/// Serialize `message` as one frame appended to `dst`.
///
/// Extended frames carry the payload with trailing zeros trimmed; legacy
/// frames carry it whole. When `signing` is given and signs outgoing frames,
/// an extended frame gets the signed flag and a signature block. Returns the
/// number of bytes written.
pub fn pack(
    message: &Message,
    fields: HeaderFields,
    force_legacy: bool,
    signing: Option<&mut SigningContext>,
    dst: &mut BytesMut,
) -> Result<usize, PackError> {
    let version = if force_legacy {
        ProtocolVersion::V1
    } else {
        ProtocolVersion::V2
    };
    if version == ProtocolVersion::V1 && message.id() > 0xFF {
        return Err(PackError::LegacyMessageId(message.id()));
    }

    let mut payload = [0u8; MAX_PAYLOAD_LEN];
    let full_len = message.descriptor().encoded_len();
    let mut slot = &mut payload[..full_len];
    message.encode_payload(&mut slot);

    let payload_len = match version {
        ProtocolVersion::V1 => full_len,
        ProtocolVersion::V2 => trimmed_len(&payload[..full_len]),
    };

    let signing = match version {
        ProtocolVersion::V2 => signing.filter(|ctx| ctx.signs_outgoing()),
        ProtocolVersion::V1 => None,
    };

    let header = Header {
        version,
        payload_len: payload_len as u8,
        incompat_flags: if signing.is_some() { IFLAG_SIGNED } else { 0 },
        compat_flags: match version {
            ProtocolVersion::V1 => 0,
            ProtocolVersion::V2 => fields.compat_flags,
        },
        sequence: fields.sequence,
        system_id: fields.system_id,
        component_id: fields.component_id,
        message_id: message.id(),
    };

    let start = dst.len();
    dst.reserve(header.frame_len());
    header.write(dst);
    dst.put_slice(&payload[..payload_len]);
    let checksum = frame_checksum(&dst[start + 1..], message.crc_extra());
    dst.put_u16_le(checksum);

    if let Some(ctx) = signing {
        if let Some(signature) = ctx.sign(&dst[start..]) {
            signature.write(dst);
        }
    }

    Ok(dst.len() - start)
}

/// Decode one complete frame against `dialect`.
///
/// The frame must hold exactly the bytes its header declares. The checksum
/// is verified; a signature block, if any, is parsed but not verified.
pub fn unpack(frame: &[u8], dialect: &Dialect) -> Result<Packet, DecodeError> {
    let header = complete_header(frame)?;
    let descriptor = dialect
        .lookup(header.message_id)
        .ok_or(DecodeError::UnknownMessage(header.message_id))?;

    let checksum = verify_checksum(frame, &header, descriptor.crc_extra())?;
    let payload = &frame[header.header_len()..header.checksum_offset()];
    Ok(Packet {
        header,
        message: Message::from_wire(Arc::clone(descriptor), payload),
        checksum,
        signature: signature_of(frame, &header),
        raw: Bytes::copy_from_slice(frame),
    })
}

fn complete_header(frame: &[u8]) -> Result<Header, DecodeError> {
    let header = Header::parse(frame)?.ok_or_else(|| FramingError::Truncated {
        needed: frame
            .first()
            .and_then(|stx| ProtocolVersion::from_stx(*stx))
            .map_or(1, ProtocolVersion::header_len),
        actual: frame.len(),
    })?;

    if frame.len() != header.frame_len() {
        let signature = if header.is_signed() { SIGNATURE_LEN } else { 0 };
        let overhead = header.header_len() + CHECKSUM_LEN + signature;
        return Err(FramingError::LengthMismatch {
            declared: usize::from(header.payload_len),
            actual: frame.len().saturating_sub(overhead),
        }
        .into());
    }
    Ok(header)
}

/// Checksum stored in a complete frame.
pub(crate) fn stored_checksum(frame: &[u8], header: &Header) -> u16 {
    let offset = header.checksum_offset();
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

/// Compare the stored checksum with the one computed using `crc_extra`.
pub(crate) fn verify_checksum(
    frame: &[u8],
    header: &Header,
    crc_extra: u8,
) -> Result<u16, DecodeError> {
    let received = stored_checksum(frame, header);
    let expected = frame_checksum(&frame[1..header.checksum_offset()], crc_extra);
    if received != expected {
        return Err(DecodeError::ChecksumMismatch {
            message_id: header.message_id,
            expected,
            received,
        });
    }
    Ok(received)
}

pub(crate) fn signature_of(frame: &[u8], header: &Header) -> Option<Signature> {
    if !header.is_signed() {
        return None;
    }
    let start = header.checksum_offset() + CHECKSUM_LEN;
    Signature::from_bytes(frame.get(start..start + SIGNATURE_LEN)?)
}

pub(crate) fn unknown_packet(frame: &[u8], header: Header) -> UnknownPacket {
    UnknownPacket {
        header,
        payload: Bytes::copy_from_slice(&frame[header.header_len()..header.checksum_offset()]),
        checksum: stored_checksum(frame, &header),
        signature: signature_of(frame, &header),
        raw: Bytes::copy_from_slice(frame),
    }
}
