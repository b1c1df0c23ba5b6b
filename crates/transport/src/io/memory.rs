//! In-memory channel implementation for testing

use std::io::{self, BufRead, Cursor, Read, Write};

use crossbeam_channel::{Receiver, Sender};

use super::Channel;

/// In-memory channel for testing
///
/// Data written to one end of a pair can be read from the other without any
/// OS resources. Dropping one end closes the stream for the other, which is
/// how tests simulate the traced program exiting.
///
/// # Examples
///
/// ```
/// use std::io::{Read, Write};
/// use transport::io::{Channel, InMemoryChannel};
///
/// let (client, server) = InMemoryChannel::pair();
/// let (_client_reader, mut client_writer) = client.split()?;
/// let (mut server_reader, _server_writer) = server.split()?;
///
/// client_writer.write_all(b"hi")?;
/// let mut buf = [0u8; 2];
/// server_reader.read_exact(&mut buf)?;
/// assert_eq!(&buf, b"hi");
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct InMemoryChannel {
    reader: InMemoryReader,
    writer: InMemoryWriter,
}

/// Reader half of an in-memory channel
///
/// Blocks until the peer writes or disconnects; a disconnect is end of stream.
pub struct InMemoryReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of an in-memory channel
pub struct InMemoryWriter {
    tx: Sender<Vec<u8>>,
}

impl InMemoryChannel {
    /// Create a connected pair of channels
    ///
    /// Returns `(client, server)`; either may be used for either role.
    pub fn pair() -> (Self, Self) {
        let (client_tx, server_rx) = crossbeam_channel::unbounded();
        let (server_tx, client_rx) = crossbeam_channel::unbounded();

        let client = Self {
            reader: InMemoryReader {
                buffer: Cursor::new(Vec::new()),
                rx: client_rx,
            },
            writer: InMemoryWriter { tx: client_tx },
        };

        let server = Self {
            reader: InMemoryReader {
                buffer: Cursor::new(Vec::new()),
                rx: server_rx,
            },
            writer: InMemoryWriter { tx: server_tx },
        };

        (client, server)
    }
}

impl Channel for InMemoryChannel {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}

impl BufRead for InMemoryReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.recv() {
                Ok(data) => self.buffer = Cursor::new(data),
                // peer dropped its writer
                Err(_) => return Ok(&[]),
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
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
