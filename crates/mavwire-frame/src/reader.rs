use std::io::{ErrorKind, Read};
use std::sync::Arc;

use mavwire_registry::Dialect;

use crate::codec::Packet;
use crate::config::FrameConfig;
use crate::error::{DecodeError, FrameError, Result};
use crate::parser::{FrameParser, ParseEvent};
use crate::signing::SigningContext;

/// Reads MAVLink frames from any `Read` stream.
///
/// Partial reads are handled internally. Decode failures are per frame: the
/// parser has already resynchronized when one is returned, so the reader
/// stays usable.
#[derive(Debug)]
pub struct FrameReader<T> {
    inner: T,
    parser: FrameParser,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T, dialect: Arc<Dialect>) -> Self {
        Self::with_config(inner, dialect, FrameConfig::default())
    }

    pub fn with_config(inner: T, dialect: Arc<Dialect>, config: FrameConfig) -> Self {
        Self {
            inner,
            parser: FrameParser::with_config(dialect, config.parser),
            chunk: vec![0; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Verify incoming signatures with `signing`.
    pub fn with_signing(mut self, signing: SigningContext) -> Self {
        self.parser.set_signing(Some(signing));
        self
    }

    /// Read until the parser produces an event (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, even
    /// if a partial frame is buffered.
    pub fn read_event(&mut self) -> Result<ParseEvent> {
        loop {
            if let Some(event) = self.parser.next_event() {
                return Ok(event);
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.parser.push(&self.chunk[..read]);
        }
    }

    /// Read the next decoded packet (blocking).
    ///
    /// Bad data and unknown message ids come back as
    /// [`FrameError::Decode`]; call again to continue with the next frame.
    pub fn read_packet(&mut self) -> Result<Packet> {
        match self.read_event()? {
            ParseEvent::Message(packet) => Ok(packet),
            ParseEvent::Unknown(unknown) => {
                Err(DecodeError::UnknownMessage(unknown.header.message_id).into())
            }
            ParseEvent::Bad(bad) => Err(bad.error.into()),
        }
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut FrameParser {
        &mut self.parser
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream. Buffered bytes are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use mavwire_registry::{Message, Registry};

    use super::*;
    use crate::codec::pack;
    use crate::error::FramingError;
    use crate::header::HeaderFields;

    fn common() -> Arc<Dialect> {
        Registry::builtin().unwrap().dialect("common").unwrap()
    }

    fn ping_frame(dialect: &Dialect, seq: u32) -> Vec<u8> {
        let msg = Message::new(Arc::clone(dialect.lookup("PING").unwrap()))
            .with("seq", seq)
            .unwrap()
            .with("time_usec", 1_000_000u64 * u64::from(seq))
            .unwrap();
        let fields = HeaderFields {
            sequence: seq as u8,
            system_id: 255,
            component_id: 190,
            compat_flags: 0,
        };
        let mut wire = BytesMut::new();
        pack(&msg, fields, false, None, &mut wire).unwrap();
        wire.to_vec()
    }

    fn seq_of(packet: &Packet) -> u32 {
        packet.message.get("seq").and_then(|v| v.as_u64()).unwrap() as u32
    }

    #[test]
    fn read_single_packet() {
        let dialect = common();
        let wire = ping_frame(&dialect, 1);

        let mut reader = FrameReader::new(Cursor::new(wire), dialect);
        let packet = reader.read_packet().unwrap();

        assert_eq!(packet.name(), "PING");
        assert_eq!(packet.header.system_id, 255);
        assert_eq!(seq_of(&packet), 1);
    }

    #[test]
    fn read_multiple_packets() {
        let dialect = common();
        let mut wire = Vec::new();
        for seq in 1..=3 {
            wire.extend(ping_frame(&dialect, seq));
        }

        let mut reader = FrameReader::new(Cursor::new(wire), dialect);
        for seq in 1..=3 {
            assert_eq!(seq_of(&reader.read_packet().unwrap()), seq);
        }
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn partial_read_handling() {
        let dialect = common();
        let byte_reader = ByteByByteReader {
            bytes: ping_frame(&dialect, 4),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader, dialect);

        assert_eq!(seq_of(&reader.read_packet().unwrap()), 4);
    }

    #[test]
    fn small_read_chunks() {
        let dialect = common();
        let mut wire = ping_frame(&dialect, 1);
        wire.extend(ping_frame(&dialect, 2));

        let cfg = FrameConfig {
            read_chunk_size: 3,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire), dialect, cfg);
        assert_eq!(seq_of(&reader.read_packet().unwrap()), 1);
        assert_eq!(seq_of(&reader.read_packet().unwrap()), 2);
        assert_eq!(reader.config().read_chunk_size, 3);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), common());
        let err = reader.read_event().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let dialect = common();
        let mut wire = ping_frame(&dialect, 9);
        wire.truncate(wire.len() - 3);

        let mut reader = FrameReader::new(Cursor::new(wire), dialect);
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(reader.parser().buf_len() > 0);
    }

    #[test]
    fn bad_frame_then_good_frame() {
        let dialect = common();
        let mut wire = vec![0xFD, 0x05, 0xFF];
        wire.extend(ping_frame(&dialect, 7));

        let mut reader = FrameReader::new(Cursor::new(wire), dialect);
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Decode(DecodeError::Framing(FramingError::UnsupportedFlags(0xFF)))
        ));
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::Decode(DecodeError::Framing(FramingError::BadMarker(0x05)))
        ));
        assert_eq!(seq_of(&reader.read_packet().unwrap()), 7);
        assert_eq!(reader.parser().stats().receive_errors, 1);
    }

    #[test]
    fn unknown_message_reported() {
        let dialect = common();
        let minimal = Registry::builtin().unwrap().dialect("minimal").unwrap();
        let wire = ping_frame(&dialect, 2);

        let mut reader = FrameReader::new(Cursor::new(wire), minimal);
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Decode(DecodeError::UnknownMessage(4))
        ));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), common());

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _ = reader.parser_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let dialect = common();
        let reader = WouldBlockThenData {
            state: 0,
            bytes: ping_frame(&dialect, 1),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader, dialect);
        let err = framed.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn interrupted_read_retries() {
        let dialect = common();
        let reader = InterruptedThenData {
            state: 0,
            bytes: ping_frame(&dialect, 8),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader, dialect);
        assert_eq!(seq_of(&framed.read_packet().unwrap()), 8);
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let dialect = common();
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right, Arc::clone(&dialect));

        writer.send(&ping_frame(&dialect, 11)).unwrap();
        writer.send(&ping_frame(&dialect, 12)).unwrap();

        assert_eq!(seq_of(&reader.read_packet().unwrap()), 11);
        assert_eq!(seq_of(&reader.read_packet().unwrap()), 12);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct WouldBlockThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            copy_remaining(&self.bytes, &mut self.pos, buf)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            copy_remaining(&self.bytes, &mut self.pos, buf)
        }
    }

    fn copy_remaining(bytes: &[u8], pos: &mut usize, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = (bytes.len() - *pos).min(buf.len());
        buf[..n].copy_from_slice(&bytes[*pos..*pos + n]);
        *pos += n;
        Ok(n)
    }
}
