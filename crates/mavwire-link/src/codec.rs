use bytes::BytesMut;
use mavwire_frame::ParseEvent;
use mavwire_registry::Message;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LinkError;
use crate::link::Link;

/// `tokio_util` codec driving a [`Link`].
///
/// Decoding yields every parser event, bad data and unknown messages
/// included. Encoding packs through the link, so sequencing, signing and
/// counters behave as with [`Link::pack`].
#[derive(Debug)]
pub struct LinkCodec {
    link: Link,
}

impl LinkCodec {
    pub fn new(link: Link) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }

    pub fn into_inner(self) -> Link {
        self.link
    }
}

impl Decoder for LinkCodec {
    type Item = ParseEvent;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ParseEvent>, LinkError> {
        if !src.is_empty() {
            let bytes = src.split();
            self.link.push(&bytes);
        }
        Ok(self.link.next_event())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ParseEvent>, LinkError> {
        let event = self.decode(src)?;
        if event.is_none() && self.link.buf_len() > 0 {
            tracing::debug!(
                buffered = self.link.buf_len(),
                "stream ended inside a frame"
            );
        }
        Ok(event)
    }
}

impl Encoder<Message> for LinkCodec {
    type Error = LinkError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), LinkError> {
        Encoder::<&Message>::encode(self, &item, dst)
    }
}

impl Encoder<&Message> for LinkCodec {
    type Error = LinkError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), LinkError> {
        self.link.pack_into(item, dst)?;
        Ok(())
    }
}
