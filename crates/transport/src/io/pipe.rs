//! Inherited file descriptor channel

use std::fs::File;
use std::io::BufReader;
use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd, RawFd};

use eyre::{Context, Result};
use nix::fcntl::{FcntlArg, fcntl};

use super::Channel;

/// Channel over a pair of file descriptors
///
/// The launcher creates two pipes and hands one end of each to the traced
/// program, which finds the descriptor numbers in its environment.
pub struct PipeChannel {
    input: File,
    output: File,
}

impl PipeChannel {
    pub fn new(input: OwnedFd, output: OwnedFd) -> Self {
        Self {
            input: File::from(input),
            output: File::from(output),
        }
    }

    /// Take ownership of descriptors inherited from the parent process
    ///
    /// Both descriptors are checked to be open before ownership is taken.
    ///
    /// # Safety
    ///
    /// The descriptors must not be owned by anything else in this process;
    /// they are closed when the channel halves are dropped.
    pub unsafe fn from_raw_fds(input: RawFd, output: RawFd) -> Result<Self> {
        for fd in [input, output] {
            // SAFETY: only used for the duration of the fcntl call
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            fcntl(borrowed, FcntlArg::F_GETFD)
                .with_context(|| format!("file descriptor {fd} is not open"))?;
        }
        // SAFETY: guaranteed by the caller
        let (input, output) = unsafe { (OwnedFd::from_raw_fd(input), OwnedFd::from_raw_fd(output)) };
        Ok(Self::new(input, output))
    }
}

impl Channel for PipeChannel {
    type Reader = BufReader<File>;
    type Writer = File;

    fn split(self) -> Result<(Self::Reader, Self::Writer)> {
        Ok((BufReader::new(self.input), self.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Response, ResponseBody};

    #[test]
    fn test_pipe_pair() -> Result<()> {
        let (read_end, write_end) = nix::unistd::pipe().context("creating pipe")?;
        let (spare_read, spare_write) = nix::unistd::pipe().context("creating pipe")?;

        let server = PipeChannel::new(spare_read, write_end);
        let client = PipeChannel::new(read_end, spare_write);
        let (_server_reader, mut server_writer) = server.split()?;
        let (mut client_reader, _client_writer) = client.split()?;

        let response = Response::new(2, ResponseBody::Running { pid: 1234 });
        response.send(&mut server_writer)?;
        assert_eq!(Response::recv(&mut client_reader)?, response);
        Ok(())
    }

    #[test]
    fn test_closed_descriptor_is_rejected() {
        // far above anything a test process has open
        let result = unsafe { PipeChannel::from_raw_fds(4000, 4001) };
        assert!(result.is_err());
    }
}
