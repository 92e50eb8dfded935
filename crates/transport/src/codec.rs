//! Wire codec implementation using tokio-util.
//!
//! This module provides [`WireCodec`], which implements both the `Encoder` and
//! `Decoder` traits from tokio-util, and [`FrameDecoder`], a push-based wrapper
//! for callers that read the socket themselves.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::message::{Frame, Message};
use crate::word::{MAX_TOKEN_LEN, Word};

/// Default maximum payload size (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Enough digits for any `usize`.
const MAX_LENGTH_DIGITS: usize = 20;

/// Codec for the line-oriented debugger protocol.
///
/// Each message is a token optionally followed by a length-prefixed payload:
/// ```text
/// >Word<\n
/// >Word<<length>\0<payload>\n
/// ```
/// The explicit length lets payloads carry embedded newlines. For older peers
/// the decoder also accepts `>Word<text\n`, where the payload runs to the end
/// of the line.
#[derive(Debug, Clone)]
pub struct WireCodec {
    /// Maximum allowed payload size in bytes.
    max_payload_size: usize,
}

impl WireCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Create a new codec with a custom maximum payload size.
    ///
    /// Larger payloads are rejected with [`ProtocolError::MessageTooLarge`].
    pub fn with_max_size(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    fn too_large(&self, size: usize) -> ProtocolError {
        ProtocolError::MessageTooLarge {
            size,
            max: self.max_payload_size,
        }
    }

    /// Decode the message whose token ends at `body_start`.
    fn decode_message(
        &self,
        word: Word,
        body_start: usize,
        src: &mut BytesMut,
    ) -> Result<Option<Frame>, ProtocolError> {
        let rest = &src[body_start..];
        let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();

        if digits > 0 && digits == rest.len() {
            // Cannot yet tell a length prefix from a numeric legacy payload
            if rest.len() > self.max_payload_size {
                return Err(self.too_large(rest.len()));
            }
            return Ok(None);
        }

        if digits > 0 && rest[digits] == b'\0' {
            if digits > MAX_LENGTH_DIGITS {
                return Err(ProtocolError::MalformedLength);
            }
            let length: usize = std::str::from_utf8(&rest[..digits])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(ProtocolError::MalformedLength)?;
            if length > self.max_payload_size {
                return Err(self.too_large(length));
            }

            let payload_start = body_start + digits + 1;
            let total_length = payload_start + length + 1;
            if src.len() < total_length {
                src.reserve(total_length - src.len());
                return Ok(None);
            }
            if src[total_length - 1] != b'\n' {
                return Err(ProtocolError::MissingTerminator { word });
            }

            let payload = std::str::from_utf8(&src[payload_start..payload_start + length])
                .map_err(|_| ProtocolError::InvalidUtf8)?
                .to_owned();
            src.advance(total_length);
            return Ok(Some(Frame::Message(Message { word, payload })));
        }

        let Some(line_end) = rest.iter().position(|&b| b == b'\n') else {
            if rest.len() > self.max_payload_size {
                return Err(self.too_large(rest.len()));
            }
            return Ok(None);
        };

        let mut payload = &rest[..line_end];
        if let Some(stripped) = payload.strip_suffix(b"\r") {
            payload = stripped;
        }
        let payload = std::str::from_utf8(payload)
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_owned();
        src.advance(body_start + line_end + 1);

        Ok(Some(Frame::Message(Message { word, payload })))
    }

    /// Decode text that does not start with a protocol token.
    fn decode_output(&self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let line_end = src.iter().position(|&b| b == b'\n');
        let limit = line_end.unwrap_or(src.len());

        let mut token_start = None;
        for start in (0..limit).filter(|&i| src[i] == b'>') {
            match scan_token(&src[start..]) {
                TokenScan::Word(..) if start > 0 => {
                    token_start = Some(start);
                    break;
                }
                TokenScan::Incomplete => return Ok(None),
                _ => continue,
            }
        }

        if let Some(start) = token_start {
            let text = src.split_to(start);
            return Ok(Some(Frame::Output(
                String::from_utf8_lossy(&text).into_owned(),
            )));
        }

        let Some(line_end) = line_end else {
            if src.len() > self.max_payload_size {
                return Err(self.too_large(src.len()));
            }
            return Ok(None);
        };

        let line = src.split_to(line_end + 1);
        let mut text = &line[..line_end];
        if let Some(stripped) = text.strip_suffix(b"\r") {
            text = stripped;
        }
        Ok(Some(Frame::Output(String::from_utf8_lossy(text).into_owned())))
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src[0] == b'>' {
            match scan_token(src) {
                TokenScan::Word(word, body_start) => {
                    return self.decode_message(word, body_start, src);
                }
                TokenScan::Incomplete => return Ok(None),
                TokenScan::Unknown(name) => return Err(ProtocolError::UnknownWord(name)),
                TokenScan::Unterminated => return Err(ProtocolError::MalformedToken),
                TokenScan::NotToken => {}
            }
        }

        self.decode_output(src)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    tracing::debug!(bytes = buf.len(), "discarding partial message at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<&Message> for WireCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload.as_bytes();
        if payload.len() > self.max_payload_size {
            return Err(self.too_large(payload.len()));
        }

        let name = item.word.name().as_bytes();
        // ">" + name + "<" + digits + "\0" + payload + "\n"
        dst.reserve(name.len() + payload.len() + MAX_LENGTH_DIGITS + 4);
        dst.put_u8(b'>');
        dst.put_slice(name);
        dst.put_u8(b'<');
        if !payload.is_empty() {
            dst.put_slice(payload.len().to_string().as_bytes());
            dst.put_u8(b'\0');
            dst.put_slice(payload);
        }
        dst.put_u8(b'\n');

        Ok(())
    }
}

impl Encoder<Message> for WireCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&Message>>::encode(self, &item, dst)
    }
}

/// Outcome of looking for a token at the start of a buffer.
enum TokenScan {
    /// A known word; the payload starts at the given offset.
    Word(Word, usize),
    /// A bracketed name outside the vocabulary.
    Unknown(String),
    /// `>` followed by letters and then a newline.
    Unterminated,
    /// Not shaped like a token at all.
    NotToken,
    /// Not enough bytes to decide.
    Incomplete,
}

/// Inspect `buf`, which must start with `>`.
fn scan_token(buf: &[u8]) -> TokenScan {
    debug_assert_eq!(buf.first(), Some(&b'>'));

    let window = &buf[1..buf.len().min(MAX_TOKEN_LEN)];
    for (i, &b) in window.iter().enumerate() {
        match b {
            b'<' if i > 0 => {
                let name = String::from_utf8_lossy(&window[..i]).into_owned();
                return match Word::from_name(&name) {
                    Some(word) => TokenScan::Word(word, i + 2),
                    None => TokenScan::Unknown(name),
                };
            }
            b'\n' if i > 0 => return TokenScan::Unterminated,
            b if b.is_ascii_alphabetic() => continue,
            _ => return TokenScan::NotToken,
        }
    }

    if buf.len() < MAX_TOKEN_LEN {
        TokenScan::Incomplete
    } else {
        TokenScan::NotToken
    }
}

/// Push-based decoder for callers that own the read loop.
///
/// Bytes are appended with [`FrameDecoder::push`]; the returned iterator
/// yields every complete frame and leaves any trailing fragment buffered for
/// the next push. After a decode error the iterator yields nothing further.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    codec: WireCodec,
    buffer: BytesMut,
    failed: bool,
}

impl FrameDecoder {
    pub fn new(codec: WireCodec) -> Self {
        Self {
            codec,
            buffer: BytesMut::new(),
            failed: false,
        }
    }

    /// Append bytes and iterate over the frames that are now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.extend(bytes);
        self.frames()
    }

    /// Append bytes without decoding anything yet.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Iterate over complete frames without appending anything.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Number of bytes waiting for the rest of their message.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message, returning how many bytes were discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.buffer.len();
        self.buffer.clear();
        n
    }
}

/// Lazy sequence of decoded frames, see [`FrameDecoder::push`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.decoder.failed {
            return None;
        }
        match self.decoder.codec.decode(&mut self.decoder.buffer) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.decoder.failed = true;
                Some(Err(e))
            }
        }
    }
}
