//! Inherited OS handle channel

use std::fs::File;
use std::io::BufReader;
use std::os::windows::io::{FromRawHandle, OwnedHandle, RawHandle};

use eyre::Result;

use super::Channel;

/// Channel over a pair of inherited pipe handles
pub struct HandleChannel {
    input: File,
    output: File,
}

impl HandleChannel {
    pub fn new(input: OwnedHandle, output: OwnedHandle) -> Self {
        Self {
            input: File::from(input),
            output: File::from(output),
        }
    }

    /// Take ownership of handle values inherited from the parent process
    ///
    /// # Safety
    ///
    /// The handles must be open and not owned by anything else in this process.
    pub unsafe fn from_raw_handles(input: usize, output: usize) -> Self {
        // SAFETY: guaranteed by the caller
        let (input, output) = unsafe {
            (
                OwnedHandle::from_raw_handle(input as RawHandle),
                OwnedHandle::from_raw_handle(output as RawHandle),
            )
        };
        Self::new(input, output)
    }
}

impl Channel for HandleChannel {
    type Reader = BufReader<File>;
    type Writer = File;

    fn split(self) -> Result<(Self::Reader, Self::Writer)> {
        Ok((BufReader::new(self.input), self.output))
    }
}
