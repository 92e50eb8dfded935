//! Debugger wire protocol
//!
//! This crate contains the line-oriented protocol spoken between an IDE and a
//! debuggee: the closed [`Word`] vocabulary, the [`WireCodec`] that frames
//! messages on a byte stream, typed [`Request`]s and [`Response`]s, and
//! blocking and async ways of moving them over a socket.
//!
//! # Wire format
//!
//! ```text
//! >Word<\n
//! >Word<<length>\0<payload>\n
//! ```
//!
//! Anything the debuggee prints outside of a token arrives as
//! [`Frame::Output`].
pub mod bindings;
mod codec;
mod error;
pub mod framed;
pub mod io;
mod message;
pub mod reader;
pub mod requests;
pub mod responses;
pub mod types;
mod word;
pub mod writer;

pub use codec::{DEFAULT_MAX_PAYLOAD_SIZE, FrameDecoder, Frames, WireCodec};
pub use error::ProtocolError;
pub use io::{InMemoryTransport, TcpTransport, Transport};
pub use message::{Frame, Message};
pub use reader::{PollResult, Reader};
pub use requests::Request;
pub use responses::Response;
pub use word::Word;
pub use writer::Writer;
