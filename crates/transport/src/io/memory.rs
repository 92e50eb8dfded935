//! In-memory transport implementation for testing

use std::io::{self, BufRead, Cursor, Read, Write};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::Transport;

/// In-memory transport for testing
///
/// This transport uses channels for bidirectional communication without
/// requiring actual network connections. Dropping one side's writer looks like
/// a closed socket to the other side's reader.
///
/// ```
/// use transport::io::InMemoryTransport;
///
/// let (ide, debuggee) = InMemoryTransport::pair();
/// // ide writes -> debuggee reads
/// // debuggee writes -> ide reads
/// ```
pub struct InMemoryTransport {
    reader: InMemoryReader,
    writer: InMemoryWriter,
}

/// Reader half of in-memory transport
///
/// When the channel is empty it returns `WouldBlock` to simulate the read
/// timeout of a TCP socket.
pub struct InMemoryReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of in-memory transport
#[derive(Clone)]
pub struct InMemoryWriter {
    tx: Sender<Vec<u8>>,
}

impl InMemoryTransport {
    /// Create a connected pair of in-memory transports
    pub fn pair() -> (Self, Self) {
        let (ide_tx, debuggee_rx) = crossbeam_channel::unbounded();
        let (debuggee_tx, ide_rx) = crossbeam_channel::unbounded();

        let ide = Self {
            reader: InMemoryReader::new(ide_rx),
            writer: InMemoryWriter { tx: ide_tx },
        };

        let debuggee = Self {
            reader: InMemoryReader::new(debuggee_rx),
            writer: InMemoryWriter { tx: debuggee_tx },
        };

        (ide, debuggee)
    }
}

impl Transport for InMemoryTransport {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}

impl InMemoryReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            buffer: Cursor::new(Vec::new()),
            rx,
        }
    }
}

impl BufRead for InMemoryReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        // If current buffer is exhausted, try to get more data
        if self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.try_recv() {
                Ok(data) => {
                    self.buffer = Cursor::new(data);
                }
                Err(TryRecvError::Empty) => {
                    // Matches the TCP transport's read timeout semantics
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "no data available",
                    ));
                }
                Err(TryRecvError::Disconnected) => {
                    // Channel closed, return EOF
                    return Ok(&[]);
                }
            }
        }

        self.buffer.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.consume(amt)
    }
}

impl Read for InMemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = std::cmp::min(available.len(), buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // No-op for channels (always immediately flushed)
        Ok(())
    }
}
