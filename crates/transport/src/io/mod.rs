//! IO abstraction layer for debugger channels
//!
//! A channel is a duplex byte stream owned by exactly one side of a session.
//! The core trait [`Channel`] lets the client and the in-process server work
//! with inherited pipes, TCP sockets, OS handles or in-memory pairs without
//! caring which one they were given.
//!
//! # Examples
//!
//! ## Using TCP
//!
//! ```no_run
//! use transport::io::{Channel, TcpChannel};
//! use transport::{Request, RequestBody};
//!
//! let channel = TcpChannel::connect("127.0.0.1:9118")?;
//! let (_reader, mut writer) = channel.split()?;
//! Request::new(1, RequestBody::Run).send(&mut writer)?;
//! # Ok::<(), eyre::Error>(())
//! ```
//!
//! ## Using an in-memory pair for testing
//!
//! ```
//! use transport::io::{Channel, InMemoryChannel};
//! use transport::{Request, RequestBody};
//!
//! let (client, server) = InMemoryChannel::pair();
//! let (_client_reader, mut client_writer) = client.split()?;
//! let (mut server_reader, _server_writer) = server.split()?;
//!
//! Request::new(1, RequestBody::Run).send(&mut client_writer)?;
//! let request = Request::recv(&mut server_reader)?;
//! assert_eq!(request.body, RequestBody::Run);
//! # Ok::<(), eyre::Error>(())
//! ```

use std::io::{Read, Write};

#[cfg(windows)]
mod handle;
mod memory;
#[cfg(unix)]
mod pipe;
mod tcp;

#[cfg(test)]
mod tests;

#[cfg(windows)]
pub use handle::HandleChannel;
pub use memory::InMemoryChannel;
#[cfg(unix)]
pub use pipe::PipeChannel;
pub use tcp::TcpChannel;

/// Trait for a duplex channel between client and server
///
/// Implementations must provide a way to split the channel into separate
/// reader and writer halves that can be moved into different threads.
///
/// # Requirements
///
/// - Reads block until data is available; there is no timeout anywhere in the
///   protocol, so readers must not return `WouldBlock`
/// - End of stream is reported as a zero-length read
/// - Both reader and writer must be `Send + 'static` to work with background threads
///
/// # Thread Safety
///
/// Typically:
/// - The reader is moved into a background thread (the server's command
///   reader, or the client's response pump)
/// - The writer stays with the thread that issues messages
pub trait Channel: Send + 'static {
    /// The reader half
    type Reader: Read + Send + 'static;

    /// The writer half
    type Writer: Write + Send + 'static;

    /// Split the channel into separate reader and writer halves
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be split (e.g., socket cloning fails)
    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)>;
}

/// A channel whose concrete kind is only known at runtime
pub struct BoxedChannel {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
}

impl BoxedChannel {
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn from_channel<C: Channel>(channel: C) -> eyre::Result<Self> {
        let (reader, writer) = channel.split()?;
        Ok(Self::new(reader, writer))
    }
}

impl Channel for BoxedChannel {
    type Reader = Box<dyn Read + Send>;
    type Writer = Box<dyn Write + Send>;

    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}
