//! Async framing over tokio streams.
//!
//! For hosts that run an async runtime, [`framed`] wraps any
//! `AsyncRead + AsyncWrite` in a [`Framed`] that yields [`Frame`]s as a
//! `Stream` and accepts [`Message`]s as a `Sink`.
//!
//! [`Frame`]: crate::Frame
//! [`Message`]: crate::Message

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::codec::WireCodec;

pub fn framed<T>(io: T) -> Framed<T, WireCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, WireCodec::new())
}

pub fn framed_with_codec<T>(io: T, codec: WireCodec) -> Framed<T, WireCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, codec)
}
