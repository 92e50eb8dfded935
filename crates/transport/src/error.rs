//! Error types for the wire protocol.

use std::io;

use crate::Word;

/// Errors that can occur while encoding, decoding or transporting protocol
/// messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A `>...<` token named a word outside the protocol vocabulary.
    #[error("unknown protocol word {0:?}")]
    UnknownWord(String),

    /// A line started with `>` but carried no closing `<`.
    #[error("malformed protocol token")]
    MalformedToken,

    /// Message contents were not valid UTF-8.
    #[error("invalid UTF-8 in message")]
    InvalidUtf8,

    /// The length prefix could not be parsed.
    #[error("malformed payload length")]
    MalformedLength,

    /// A length-prefixed payload was not followed by the line terminator.
    #[error("payload for {word} not terminated by newline")]
    MissingTerminator {
        /// The word whose payload was unterminated.
        word: Word,
    },

    /// The payload exceeds the configured maximum size.
    #[error("payload size {size} exceeds maximum allowed {max}")]
    MessageTooLarge {
        /// The declared or actual payload size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// The payload did not have the structure its word requires.
    #[error("malformed {word} payload: {reason}")]
    MalformedPayload {
        /// The word whose payload failed to parse.
        word: Word,
        /// Why parsing failed.
        reason: String,
    },
}

impl ProtocolError {
    pub(crate) fn payload(word: Word, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            word,
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the peer is gone rather than that it sent
    /// something we could not understand.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
