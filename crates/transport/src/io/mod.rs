//! IO abstraction layer for the debugger transport
//!
//! The core trait [`Transport`] allows plugging in different IO
//! implementations such as TCP sockets or in-memory channels.
//!
//! # Examples
//!
//! ## Using TCP Transport
//!
//! ```no_run
//! use transport::io::{TcpTransport, Transport};
//! use transport::{Reader, Writer};
//!
//! let transport = TcpTransport::connect("127.0.0.1:42000")?;
//! let (input, output) = transport.split()?;
//! let reader = Reader::new(input);
//! let writer = Writer::new(output);
//! # Ok::<(), eyre::Error>(())
//! ```
//!
//! ## Using In-Memory Transport for Testing
//!
//! ```
//! use transport::io::{InMemoryTransport, Transport};
//!
//! let (ide, debuggee) = InMemoryTransport::pair();
//! let (ide_reader, ide_writer) = ide.split()?;
//! # Ok::<(), eyre::Error>(())
//! ```

use std::io::{Read, Write};

mod memory;
mod tcp;


pub use memory::{InMemoryReader, InMemoryTransport, InMemoryWriter};
pub use tcp::TcpTransport;

/// Trait for a bidirectional byte transport to a debuggee
///
/// Implementations must provide a way to split the transport into separate
/// reader and writer halves that can be moved into different threads.
///
/// # Requirements
///
/// - Both reader and writer must be `Send + 'static` to work with background threads
/// - Readers should return `WouldBlock` (or `TimedOut`) when no data arrives
///   within their read timeout, so that polling loops stay responsive
/// - Readers return `Ok(0)` once the peer is gone
pub trait Transport: Send + 'static {
    /// The reader type
    type Reader: Read + Send + 'static;

    /// The writer type
    type Writer: Write + Send + 'static;

    /// Split the transport into separate reader and writer halves
    ///
    /// - For TCP: Creates cloned handles to the same underlying socket
    /// - For in-memory: Returns the two ends of a bidirectional channel
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be split (e.g., socket cloning fails)
    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)>;
}
