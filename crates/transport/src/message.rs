//! Protocol messages and decoded frames.

use std::fmt;

use crate::Word;

/// A single protocol message: a word and its (possibly empty) payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub word: Word,
    pub payload: String,
}

impl Message {
    /// A message with no payload.
    pub fn bare(word: Word) -> Self {
        Self {
            word,
            payload: String::new(),
        }
    }

    pub fn new(word: Word, payload: impl Into<String>) -> Self {
        Self {
            word,
            payload: payload.into(),
        }
    }

    /// The end-of-transmission sentinel.
    pub fn eot() -> Self {
        Self::bare(Word::Eot)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, ">{}<", self.word)
        } else {
            write!(f, ">{}< {}", self.word, self.payload)
        }
    }
}

/// One unit produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A protocol message.
    Message(Message),
    /// Text the peer wrote to the socket outside of any protocol token,
    /// typically program output that was not newline terminated before the
    /// debugger took over the stream.
    Output(String),
}

impl Frame {
    pub fn into_message(self) -> Option<Message> {
        match self {
            Frame::Message(m) => Some(m),
            Frame::Output(_) => None,
        }
    }
}

impl From<Message> for Frame {
    fn from(value: Message) -> Self {
        Frame::Message(value)
    }
}
