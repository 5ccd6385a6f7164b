use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use mavwire_registry::Message;

use crate::codec::pack;
use crate::error::{FrameError, Result};
use crate::header::{HeaderFields, MAX_FRAME_LEN};
use crate::signing::SigningContext;

/// Writes complete MAVLink frames to any `Write` stream.
#[derive(Debug)]
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Pack `message` and write it (blocking). Returns the frame length.
    pub fn write_message(
        &mut self,
        message: &Message,
        fields: HeaderFields,
        force_legacy: bool,
        signing: Option<&mut SigningContext>,
    ) -> Result<usize> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let packed = pack(message, fields, force_legacy, signing, &mut buf);
        let result = match packed {
            Ok(len) => self.send(&buf).map(|()| len),
            Err(err) => Err(err.into()),
        };
        self.buf = buf;
        result
    }

    /// Write already-encoded frame bytes and flush.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < frame.len() {
            match self.inner.write(&frame[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
