//! TCP-based channel implementation

use std::io::BufReader;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use eyre::{Context, Result};
use retry::{delay::Exponential, retry};

use super::Channel;

fn retry_scale() -> impl Iterator<Item = Duration> {
    Exponential::from_millis(200).take(5)
}

/// TCP-based channel
///
/// The traced program listens and accepts exactly one connection; the client
/// connects. Reads block without a timeout.
///
/// # Examples
///
/// ```no_run
/// use transport::io::TcpChannel;
///
/// let channel = TcpChannel::connect("127.0.0.1:9118")?;
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Wrap an existing stream
    ///
    /// # Errors
    ///
    /// Returns an error if the socket options cannot be applied
    pub fn new(stream: TcpStream) -> Result<Self> {
        // messages are small and latency matters while halted
        stream
            .set_nodelay(true)
            .context("disabling Nagle on TCP stream")?;
        Ok(Self { stream })
    }

    /// Connect to a listening traced program
    ///
    /// The program may still be starting up, so the connection is retried
    /// with exponential backoff before giving up.
    pub fn connect<A>(addr: A) -> Result<Self>
    where
        A: ToSocketAddrs + Clone,
    {
        let stream = retry(retry_scale(), || {
            tracing::debug!("trying to make connection");
            TcpStream::connect(addr.clone()).inspect_err(|e| {
                tracing::debug!(error = %e, "error making connection");
            })
        })
        .map_err(|e| eyre::eyre!("connecting to traced program: {}", e.error))?;
        tracing::debug!("connection made");
        Self::new(stream)
    }

    /// Listen on `addr` and wait for the single client connection
    pub fn accept(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).context("binding debugger socket")?;
        tracing::debug!(address = ?listener.local_addr().ok(), "waiting for debugger connection");
        let (stream, peer) = listener.accept().context("accepting debugger connection")?;
        tracing::debug!(%peer, "debugger connected");
        Self::new(stream)
    }
}

impl Channel for TcpChannel {
    type Reader = BufReader<TcpStream>;
    type Writer = TcpStream;

    fn split(self) -> Result<(Self::Reader, Self::Writer)> {
        let input = self
            .stream
            .try_clone()
            .context("cloning TCP stream for reader")?;
        let output = self.stream;

        Ok((BufReader::new(input), output))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::bindings::get_random_tcp_port;
    use crate::{Request, RequestBody};

    #[test]
    fn test_accept_and_connect() -> Result<()> {
        let port = get_random_tcp_port()?;

        let server = thread::spawn(move || -> Result<Request> {
            let channel = TcpChannel::accept(("127.0.0.1", port))?;
            let (mut reader, _writer) = channel.split()?;
            Ok(Request::recv(&mut reader)?)
        });

        let channel = TcpChannel::connect(("127.0.0.1", port))?;
        let (_reader, mut writer) = channel.split()?;
        Request::new(4, RequestBody::Step).send(&mut writer)?;

        let received = server.join().expect("server thread panicked")?;
        assert_eq!(received, Request::new(4, RequestBody::Step));
        Ok(())
    }
}
