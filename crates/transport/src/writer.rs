//! Blocking message writer.

use std::io::Write;

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::WireCodec;
use crate::error::ProtocolError;
use crate::message::Message;

/// Encodes messages onto any [`Write`] destination.
///
/// Every message is written whole and flushed before `send` returns, so a
/// peer never observes half a frame from us unless the connection drops.
pub struct Writer<W> {
    output: W,
    codec: WireCodec,
    buffer: BytesMut,
}

impl<W> Writer<W>
where
    W: Write,
{
    pub fn new(output: W) -> Self {
        Self::with_codec(output, WireCodec::new())
    }

    pub fn with_codec(output: W, codec: WireCodec) -> Self {
        Self {
            output,
            codec,
            buffer: BytesMut::new(),
        }
    }

    #[tracing::instrument(skip(self, message), level = "debug", fields(word = %message.word))]
    pub fn send(&mut self, message: &Message) -> Result<(), ProtocolError> {
        self.buffer.clear();
        self.codec.encode(message, &mut self.buffer)?;
        self.output.write_all(&self.buffer)?;
        self.output.flush()?;
        tracing::debug!(payload = %message.payload, "sent message");
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Word};

    #[test]
    fn writes_encoded_message() {
        let mut writer = Writer::new(Vec::new());
        writer
            .send(&Request::Continue { special: false }.into_message())
            .unwrap();
        writer.send(&Message::bare(Word::StepOver)).unwrap();

        assert_eq!(writer.into_inner(), b">Continue<1\x000\n>StepOver<\n");
    }

    #[test]
    fn oversize_message_writes_nothing() {
        let mut writer = Writer::with_codec(Vec::new(), WireCodec::with_max_size(4));
        let result = writer.send(&Message::new(Word::Eval, "0,too long"));

        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
        assert!(writer.get_ref().is_empty());
    }
}
