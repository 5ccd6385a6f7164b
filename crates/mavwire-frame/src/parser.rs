use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use mavwire_registry::{Dialect, Message};

use crate::codec::{
    signature_of, stored_checksum, unknown_packet, verify_checksum, Packet, UnknownPacket,
};
use crate::error::{DecodeError, FramingError, SignatureFailure};
use crate::header::{Header, ProtocolVersion, CHECKSUM_LEN, MAX_FRAME_LEN, STX_V1, STX_V2};
use crate::signing::SigningContext;

/// Parser behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Report every byte skipped while hunting for a start marker as its own
    /// [`BadData`] event. When off, only the first byte of each skipped run
    /// is reported and the rest are counted.
    pub robust_parsing: bool,
    /// Accept signed frames unverified when no secret key is configured.
    pub accept_signed_without_key: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            robust_parsing: false,
            accept_signed_without_key: true,
        }
    }
}

/// Bytes the parser gave up on, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadData {
    pub bytes: Bytes,
    pub error: DecodeError,
}

/// Output of the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    Message(Packet),
    Unknown(UnknownPacket),
    Bad(BadData),
}

/// Where the parser is within the current candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    SeekStart,
    ReadHeader,
    ReadPayload,
    ReadChecksum,
    ReadSignature,
    Complete,
}

/// Traffic counters of a parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub unknown_packets: u64,
    /// Candidate frames that failed a length, checksum or signature check.
    pub receive_errors: u64,
    /// Bytes skipped while looking for a start marker.
    pub bytes_dropped: u64,
}

/// Streaming MAVLink framer for one connection.
///
/// Bytes are buffered and examined only once the bytes a decision depends
/// on are present, so feeding a stream one byte at a time and feeding it in
/// bulk yield the same events. A failed candidate frame is reported with
/// the bytes examined; scanning resumes at the byte after its start marker.
#[derive(Debug)]
pub struct FrameParser {
    dialect: Arc<Dialect>,
    config: ParserConfig,
    signing: Option<SigningContext>,
    buf: BytesMut,
    stats: ParserStats,
    skipping: bool,
}

impl FrameParser {
    pub fn new(dialect: Arc<Dialect>) -> Self {
        Self::with_config(dialect, ParserConfig::default())
    }

    pub fn with_config(dialect: Arc<Dialect>, config: ParserConfig) -> Self {
        Self {
            dialect,
            config,
            signing: None,
            buf: BytesMut::with_capacity(MAX_FRAME_LEN),
            stats: ParserStats::default(),
            skipping: false,
        }
    }

    /// Verify incoming signatures with `signing`.
    pub fn with_signing(mut self, signing: SigningContext) -> Self {
        self.signing = Some(signing);
        self
    }

    pub fn set_signing(&mut self, signing: Option<SigningContext>) {
        self.signing = signing;
    }

    pub fn signing(&self) -> Option<&SigningContext> {
        self.signing.as_ref()
    }

    pub fn signing_mut(&mut self) -> Option<&mut SigningContext> {
        self.signing.as_mut()
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Append received bytes. Nothing is decoded until events are pulled.
    pub fn push(&mut self, bytes: &[u8]) {
        self.stats.bytes_received += bytes.len() as u64;
        self.buf.extend_from_slice(bytes);
    }

    /// Next event the buffered bytes allow, if any.
    pub fn next_event(&mut self) -> Option<ParseEvent> {
        self.step()
    }

    /// Feed one byte and return the next event, if one is ready.
    ///
    /// A rejected candidate can leave further events in the buffer; drain
    /// them with [`next_event`](Self::next_event).
    pub fn parse_char(&mut self, byte: u8) -> Option<ParseEvent> {
        self.push(&[byte]);
        self.next_event()
    }

    /// Feed a chunk and return every event it completes.
    pub fn parse_buffer(&mut self, bytes: &[u8]) -> Vec<ParseEvent> {
        self.push(bytes);
        let mut events = Vec::new();
        while let Some(event) = self.next_event() {
            events.push(event);
        }
        events
    }

    /// Bytes buffered but not yet consumed.
    pub fn buf_len(&self) -> usize {
        self.buf.len()
    }

    /// Minimum number of further bytes needed before the current candidate
    /// can be decided. Always at least one.
    pub fn bytes_needed(&self) -> usize {
        match self.candidate_len() {
            Some(total) => total.saturating_sub(self.buf.len()).max(1),
            None => 1,
        }
    }

    pub fn state(&self) -> ParserState {
        let header = match Header::parse(&self.buf) {
            Ok(Some(header)) => header,
            Ok(None) if self.buf.is_empty() => return ParserState::SeekStart,
            Ok(None) => return ParserState::ReadHeader,
            Err(_) => return ParserState::SeekStart,
        };

        let len = self.buf.len();
        if len < header.checksum_offset() {
            ParserState::ReadPayload
        } else if len < header.checksum_offset() + CHECKSUM_LEN {
            ParserState::ReadChecksum
        } else if len < header.frame_len() {
            ParserState::ReadSignature
        } else {
            ParserState::Complete
        }
    }

    /// Discard buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.skipping = false;
    }

    fn candidate_len(&self) -> Option<usize> {
        let version = ProtocolVersion::from_stx(*self.buf.first()?)?;
        match Header::parse(&self.buf) {
            Ok(Some(header)) => Some(header.frame_len()),
            Ok(None) => Some(version.header_len()),
            Err(_) => None,
        }
    }

    fn step(&mut self) -> Option<ParseEvent> {
        loop {
            let &first = self.buf.first()?;

            if ProtocolVersion::from_stx(first).is_none() {
                if self.config.robust_parsing {
                    self.stats.bytes_dropped += 1;
                    let bytes = self.buf.split_to(1).freeze();
                    return Some(ParseEvent::Bad(BadData {
                        bytes,
                        error: FramingError::BadMarker(first).into(),
                    }));
                }
                let skip = self
                    .buf
                    .iter()
                    .position(|b| *b == STX_V1 || *b == STX_V2)
                    .unwrap_or(self.buf.len());
                tracing::trace!(skipped = skip, "skipping bytes before start marker");
                self.stats.bytes_dropped += skip as u64;
                self.buf.advance(skip);
                if std::mem::replace(&mut self.skipping, true) {
                    continue;
                }
                return Some(ParseEvent::Bad(BadData {
                    bytes: Bytes::copy_from_slice(&[first]),
                    error: FramingError::BadMarker(first).into(),
                }));
            }
            self.skipping = false;

            let header = match Header::parse(&self.buf) {
                Ok(Some(header)) => header,
                Ok(None) => return None,
                Err(err) => {
                    let examined = self.buf.len().min(3);
                    return Some(self.reject(examined, err.into()));
                }
            };

            let frame_len = header.frame_len();
            if self.buf.len() < frame_len {
                return None;
            }

            return Some(match self.check_frame(&header, frame_len) {
                Ok(event) => {
                    self.buf.advance(frame_len);
                    event
                }
                Err(err) => self.reject(frame_len, err),
            });
        }
    }

    fn check_frame(
        &mut self,
        header: &Header,
        frame_len: usize,
    ) -> Result<ParseEvent, DecodeError> {
        let frame = &self.buf[..frame_len];

        let Some(descriptor) = self.dialect.lookup(header.message_id) else {
            check_signature(self.signing.as_mut(), &self.config, frame, header)?;
            self.stats.unknown_packets += 1;
            tracing::debug!(
                message_id = header.message_id,
                system_id = header.system_id,
                "unknown message id"
            );
            return Ok(ParseEvent::Unknown(unknown_packet(frame, *header)));
        };

        let checksum = match verify_checksum(frame, header, descriptor.crc_extra()) {
            Ok(checksum) => checksum,
            Err(err) => {
                tracing::warn!(
                    message_id = header.message_id,
                    received = stored_checksum(frame, header),
                    "checksum mismatch"
                );
                return Err(err);
            }
        };
        check_signature(self.signing.as_mut(), &self.config, frame, header)?;

        let payload = &frame[header.header_len()..header.checksum_offset()];
        let message = Message::from_wire(Arc::clone(descriptor), payload);
        self.stats.packets_received += 1;
        Ok(ParseEvent::Message(Packet {
            header: *header,
            message,
            checksum,
            signature: signature_of(frame, header),
            raw: Bytes::copy_from_slice(frame),
        }))
    }

    /// Report `examined` bytes as bad and drop only the start marker.
    fn reject(&mut self, examined: usize, error: DecodeError) -> ParseEvent {
        self.stats.receive_errors += 1;
        tracing::debug!(%error, examined, "resynchronizing after bad frame");
        let bytes = Bytes::copy_from_slice(&self.buf[..examined]);
        self.buf.advance(1);
        ParseEvent::Bad(BadData { bytes, error })
    }
}

fn check_signature(
    signing: Option<&mut SigningContext>,
    config: &ParserConfig,
    frame: &[u8],
    header: &Header,
) -> Result<(), DecodeError> {
    match signing {
        Some(ctx) if ctx.is_enabled() => {
            if header.is_signed() {
                ctx.verify(frame, header)?;
            } else {
                ctx.check_unsigned(header)?;
            }
            Ok(())
        }
        _ if header.is_signed() && !config.accept_signed_without_key => {
            Err(SignatureFailure::BadTag.into())
        }
        _ => Ok(()),
    }
}
