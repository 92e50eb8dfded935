//! Blocking frame reader.
//!
//! [`Reader`] pulls bytes from any [`Read`] source and decodes them into
//! [`Frame`]s. Sources configured with a read timeout (see
//! [`crate::io::TcpTransport`]) report `WouldBlock` when idle, which lets
//! [`Reader::try_poll_frame`] return control to a polling loop.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use crate::codec::{FrameDecoder, WireCodec};
use crate::error::ProtocolError;
use crate::message::Frame;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Result of a timeout-aware poll operation
#[derive(Debug)]
pub enum PollResult {
    /// A frame was successfully received
    Frame(Frame),
    /// The connection was closed
    Closed,
    /// The timeout expired before a complete frame was received
    Timeout,
}

enum Fill {
    Data,
    Idle,
    Closed,
}

pub struct Reader<R> {
    input: R,
    decoder: FrameDecoder,
    chunk: Box<[u8]>,
}

impl<R> Reader<R>
where
    R: Read,
{
    pub fn new(input: R) -> Self {
        Self::with_codec(input, WireCodec::new())
    }

    pub fn with_codec(input: R, codec: WireCodec) -> Self {
        Self {
            input,
            decoder: FrameDecoder::new(codec),
            chunk: vec![0; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Block until a frame arrives.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if let Some(frame) = self.decoder.frames().next().transpose()? {
                return Ok(Some(frame));
            }

            match self.fill()? {
                Fill::Data => continue,
                Fill::Closed => return Ok(None),
                Fill::Idle => {
                    // Read timeout expired with no data available.
                    // Sleep briefly to prevent spinning on sources that
                    // report WouldBlock immediately.
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    /// Attempt to receive a frame with a timeout
    ///
    /// Frames that are already buffered are returned without touching the
    /// source. Note that the actual wait may exceed `timeout` by up to the
    /// read timeout of the underlying source.
    pub fn try_poll_frame(&mut self, timeout: Duration) -> Result<PollResult, ProtocolError> {
        let start = Instant::now();

        loop {
            if let Some(frame) = self.decoder.frames().next().transpose()? {
                return Ok(PollResult::Frame(frame));
            }

            if start.elapsed() >= timeout {
                return Ok(PollResult::Timeout);
            }

            match self.fill()? {
                Fill::Data => continue,
                Fill::Closed => return Ok(PollResult::Closed),
                Fill::Idle => {
                    if start.elapsed() >= timeout {
                        return Ok(PollResult::Timeout);
                    }
                    // Brief sleep to prevent CPU spinning
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Number of bytes read but not yet decoded into a frame.
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }

    pub fn get_ref(&self) -> &R {
        &self.input
    }

    fn fill(&mut self) -> Result<Fill, ProtocolError> {
        match self.input.read(&mut self.chunk) {
            Ok(0) => {
                let discarded = self.decoder.discard();
                if discarded > 0 {
                    tracing::debug!(bytes = discarded, "connection closed mid-message");
                }
                Ok(Fill::Closed)
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "read from socket");
                self.decoder.extend(&self.chunk[..n]);
                Ok(Fill::Data)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(Fill::Idle)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Fill::Data),
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }
}
