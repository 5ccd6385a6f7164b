use std::io::Write;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use mavwire_frame::{
    pack, FrameParser, FrameWriter, HeaderFields, ParseEvent, ParserStats, SigningContext,
    MAX_FRAME_LEN,
};
use mavwire_registry::{Dialect, Message, Registry};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};

/// Traffic counters of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Candidate frames that failed a length, checksum or signature check.
    pub receive_errors: u64,
}

/// One MAVLink connection.
///
/// Owns the outgoing sequence counter and source ids, the stream parser and
/// the signing context shared by both directions. A link is not shared
/// between threads; run one per connection.
#[derive(Debug)]
pub struct Link {
    dialect: Arc<Dialect>,
    config: LinkConfig,
    sequence: u8,
    parser: FrameParser,
    packets_sent: u64,
    bytes_sent: u64,
}

impl Link {
    pub fn new(dialect: Arc<Dialect>, config: LinkConfig) -> Self {
        let mut parser = FrameParser::with_config(Arc::clone(&dialect), config.parser);
        parser.set_signing(config.signing.clone().map(SigningContext::new));
        Self {
            dialect,
            config,
            sequence: 0,
            parser,
            packets_sent: 0,
            bytes_sent: 0,
        }
    }

    /// A link speaking the dialect registered under `dialect`.
    pub fn from_registry(registry: &Registry, dialect: &str, config: LinkConfig) -> Result<Self> {
        Ok(Self::new(registry.dialect(dialect)?, config))
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Sequence number the next packed frame will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Whether outgoing frames use the legacy header.
    pub fn sends_legacy(&self) -> bool {
        self.config.force_legacy || self.dialect.legacy_only()
    }

    pub fn signing(&self) -> Option<&SigningContext> {
        self.parser.signing()
    }

    pub fn signing_mut(&mut self) -> Option<&mut SigningContext> {
        self.parser.signing_mut()
    }

    /// Replace the signing context. `None` disables signing in both directions.
    pub fn set_signing(&mut self, signing: Option<SigningContext>) {
        self.parser.set_signing(signing);
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    /// Serialize `message` into a new frame and advance the sequence number.
    pub fn pack(&mut self, message: &Message) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(MAX_FRAME_LEN);
        self.pack_into(message, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Like [`pack`](Self::pack), appending to `dst`. Returns the frame length.
    pub fn pack_into(&mut self, message: &Message, dst: &mut BytesMut) -> Result<usize> {
        self.check_dialect(message)?;

        let fields = HeaderFields {
            sequence: self.sequence,
            system_id: self.config.system_id,
            component_id: self.config.component_id,
            compat_flags: 0,
        };
        let legacy = self.sends_legacy();
        let len = pack(message, fields, legacy, self.parser.signing_mut(), dst)?;

        self.sequence = self.sequence.wrapping_add(1);
        self.packets_sent += 1;
        self.bytes_sent += len as u64;
        Ok(len)
    }

    /// Pack `message` and write it through `writer` (blocking).
    pub fn send<W: Write>(
        &mut self,
        writer: &mut FrameWriter<W>,
        message: &Message,
    ) -> Result<()> {
        let frame = self.pack(message)?;
        writer.send(&frame)?;
        Ok(())
    }

    /// Feed one received byte; returns the next event, if one is ready.
    pub fn parse_char(&mut self, byte: u8) -> Option<ParseEvent> {
        self.parser.parse_char(byte)
    }

    /// Feed received bytes; returns every event they complete.
    pub fn parse_buffer(&mut self, bytes: &[u8]) -> Vec<ParseEvent> {
        self.parser.parse_buffer(bytes)
    }

    /// Next event already decidable from buffered bytes.
    pub fn next_event(&mut self) -> Option<ParseEvent> {
        self.parser.next_event()
    }

    pub fn buf_len(&self) -> usize {
        self.parser.buf_len()
    }

    pub fn bytes_needed(&self) -> usize {
        self.parser.bytes_needed()
    }

    pub fn stats(&self) -> LinkStats {
        let ParserStats {
            bytes_received,
            packets_received,
            receive_errors,
            ..
        } = self.parser.stats();
        LinkStats {
            packets_sent: self.packets_sent,
            bytes_sent: self.bytes_sent,
            packets_received,
            bytes_received,
            receive_errors,
        }
    }

    #[cfg(feature = "async")]
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.parser.push(bytes);
    }

    fn check_dialect(&self, message: &Message) -> Result<()> {
        match self.dialect.lookup(message.id()) {
            Some(descriptor) if **descriptor == **message.descriptor() => Ok(()),
            _ => {
                tracing::warn!(
                    message_id = message.id(),
                    dialect = self.dialect.name(),
                    "refusing to pack message outside the link dialect"
                );
                Err(LinkError::NotInDialect {
                    id: message.id(),
                    name: message.name().to_string(),
                    dialect: self.dialect.name().to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mavwire_frame::{
        DecodeError, FrameReader, ProtocolVersion, SecretKey, SignatureFailure, SigningConfig,
    };

    use super::*;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    fn link(system_id: u8, config: LinkConfig) -> Link {
        Link::from_registry(
            &registry(),
            "common",
            LinkConfig {
                system_id,
                component_id: 1,
                ..config
            },
        )
        .unwrap()
    }

    fn statustext(link: &Link, text: &str) -> Message {
        Message::new(Arc::clone(link.dialect().lookup("STATUSTEXT").unwrap()))
            .with("severity", 6u8)
            .unwrap()
            .with("text", text)
            .unwrap()
    }

    fn signed(link_id: u8, key: u8) -> LinkConfig {
        LinkConfig {
            signing: Some(SigningConfig {
                link_id,
                ..SigningConfig::with_key(SecretKey::new([key; 32]))
            }),
            ..LinkConfig::default()
        }
    }

    #[test]
    fn sequence_wraps_after_256_packs() {
        let mut tx = link(1, LinkConfig::default());
        tx.set_sequence(200);
        let msg = statustext(&tx, "tick");

        let mut seen = Vec::new();
        for _ in 0..256 {
            let frame = tx.pack(&msg).unwrap();
            seen.push(frame[4]);
        }

        assert_eq!(tx.sequence(), 200);
        assert_eq!(seen[0], 200);
        assert_eq!(seen[55], 255);
        assert_eq!(seen[56], 0);
        assert_eq!(tx.stats().packets_sent, 256);
    }

    #[test]
    fn counters_track_both_directions() {
        let mut tx = link(1, LinkConfig::default());
        let mut rx = link(2, LinkConfig::default());
        let msg = statustext(&tx, "hello");

        let frame = tx.pack(&msg).unwrap();
        let events = rx.parse_buffer(&frame);
        assert_eq!(events.len(), 1);

        let sent = tx.stats();
        assert_eq!(sent.packets_sent, 1);
        assert_eq!(sent.bytes_sent, frame.len() as u64);

        let received = rx.stats();
        assert_eq!(received.packets_received, 1);
        assert_eq!(received.bytes_received, frame.len() as u64);
        assert_eq!(received.receive_errors, 0);
    }

    #[test]
    fn parse_char_reports_progress() {
        let mut tx = link(1, LinkConfig::default());
        let mut rx = link(2, LinkConfig::default());
        let frame = tx.pack(&statustext(&tx, "x")).unwrap();

        let mut events = Vec::new();
        for (i, byte) in frame.iter().enumerate() {
            if i > 0 {
                assert_eq!(rx.buf_len(), i);
                assert!(rx.bytes_needed() >= 1);
            }
            events.extend(rx.parse_char(*byte));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(rx.buf_len(), 0);
        assert!(rx.next_event().is_none());
    }

    #[test]
    fn legacy_settings_force_v1_headers() {
        let mut forced = link(
            1,
            LinkConfig {
                force_legacy: true,
                ..LinkConfig::default()
            },
        );
        let frame = forced.pack(&statustext(&forced, "v1")).unwrap();
        assert_eq!(frame[0], ProtocolVersion::V1.stx());

        let mut registry = Registry::new();
        registry
            .register_json(
                r#"{"name": "old", "legacy_only": true, "messages": [
                    {"id": 2, "name": "SYSTEM_TIME", "fields": [
                        {"name": "time_unix_usec", "type": "uint64_t"},
                        {"name": "time_boot_ms", "type": "uint32_t"}
                    ]}
                ]}"#,
            )
            .unwrap();
        let mut old = Link::from_registry(&registry, "old", LinkConfig::new(1, 1)).unwrap();
        assert!(old.sends_legacy());
        let msg = Message::new(Arc::clone(old.dialect().lookup(2u32).unwrap()));
        let frame = old.pack(&msg).unwrap();
        assert_eq!(frame[0], ProtocolVersion::V1.stx());
        assert_eq!(frame.len(), 6 + 12 + 2);
    }

    #[test]
    fn foreign_message_fails_loudly() {
        let mut registry = Registry::new();
        registry
            .register_json(
                r#"{"name": "other", "messages": [
                    {"id": 253, "name": "STATUSTEXT", "fields": [
                        {"name": "severity", "type": "uint8_t"}
                    ]}
                ]}"#,
            )
            .unwrap();
        let foreign = Message::new(Arc::clone(
            registry.dialect("other").unwrap().lookup(253u32).unwrap(),
        ));

        let mut tx = link(1, LinkConfig::default());
        let err = tx.pack(&foreign).unwrap_err();
        assert!(matches!(err, LinkError::NotInDialect { id: 253, .. }));
        assert_eq!(tx.sequence(), 0);
        assert_eq!(tx.stats().packets_sent, 0);
    }

    #[test]
    fn signed_links_interoperate() {
        let mut tx = link(1, signed(4, 0x42));
        let mut rx = link(2, signed(0, 0x42));

        let frame = tx.pack(&statustext(&tx, "armed")).unwrap();
        let events = rx.parse_buffer(&frame);
        let ParseEvent::Message(packet) = &events[0] else {
            panic!("unexpected events {events:?}");
        };
        let signature = packet.signature.unwrap();
        assert_eq!(signature.link_id, 4);

        let rx_signing = rx.signing().unwrap();
        assert_eq!(rx_signing.counters().goodsig_count, 1);
        assert!(rx_signing.timestamp() >= signature.timestamp);
        assert_eq!(tx.signing().unwrap().counters().sig_count, 1);
    }

    #[test]
    fn wrong_key_counts_bad_signature() {
        let mut tx = link(1, signed(0, 0x01));
        let mut rx = link(2, signed(0, 0x02));

        let frame = tx.pack(&statustext(&tx, "spoof")).unwrap();
        let events = rx.parse_buffer(&frame);
        assert!(matches!(
            events.first(),
            Some(ParseEvent::Bad(bad))
                if bad.error == DecodeError::SignatureRejected(SignatureFailure::BadTag)
        ));
        assert_eq!(rx.signing().unwrap().counters().badsig_count, 1);
        assert_eq!(rx.stats().receive_errors, 1);
    }

    #[test]
    fn send_through_writer() {
        let mut tx = link(1, LinkConfig::default());
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        tx.send(&mut writer, &statustext(&tx, "one")).unwrap();
        tx.send(&mut writer, &statustext(&tx, "two")).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = FrameReader::new(Cursor::new(wire), Arc::clone(tx.dialect()));
        for (seq, text) in [(0u8, "one"), (1, "two")] {
            let packet = reader.read_packet().unwrap();
            assert_eq!(packet.header.sequence, seq);
            assert_eq!(
                packet.message.get("text").and_then(|v| v.as_str()),
                Some(text)
            );
        }
    }
}
