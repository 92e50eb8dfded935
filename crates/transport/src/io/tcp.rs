//! TCP-based transport implementation

use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use eyre::{Context, Result};

use super::Transport;

/// Read timeout applied to new streams.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// TCP-based transport
///
/// # Timeout Behavior
///
/// The stream is configured with a short read timeout so the session worker
/// can interleave reads with commands and liveness checks. When no data is
/// available, the reader returns `WouldBlock` errors.
///
/// ```no_run
/// use transport::io::TcpTransport;
///
/// // Connect to a debuggee that is listening
/// let transport = TcpTransport::connect("127.0.0.1:42000")?;
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Create a new TCP transport from an existing stream
    ///
    /// # Errors
    ///
    /// Returns an error if setting the read timeout fails
    pub fn new(stream: TcpStream) -> Result<Self> {
        Self::with_read_timeout(stream, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(stream: TcpStream, timeout: Duration) -> Result<Self> {
        stream
            .set_read_timeout(Some(timeout))
            .context("setting read timeout on TCP stream")?;
        stream
            .set_nodelay(true)
            .context("disabling Nagle on TCP stream")?;
        Ok(Self { stream })
    }

    /// Connect to a debuggee at the given address
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).context("connecting to debuggee")?;
        Self::new(stream)
    }

    /// Wait for a debuggee that was started with instructions to connect back.
    pub fn accept(listener: &TcpListener) -> Result<Self> {
        let (stream, peer) = listener.accept().context("accepting debuggee connection")?;
        tracing::debug!(%peer, "debuggee connected");
        Self::new(stream)
    }

    /// Close both directions of the socket.
    pub fn close(&self) -> Result<()> {
        self.stream
            .shutdown(Shutdown::Both)
            .context("shutting down TCP stream")
    }
}

impl Transport for TcpTransport {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn split(self) -> Result<(Self::Reader, Self::Writer)> {
        // Clone stream for reader, keep original for writer
        let input = self
            .stream
            .try_clone()
            .context("cloning TCP stream for reader")?;
        Ok((input, self.stream))
    }
}
