//! Error types for the wire codec.

use std::io;

/// Errors that can occur while encoding or decoding protocol messages.
///
/// Callers are expected to treat every variant as "channel lost": the framing
/// has no message length, so there is no point at which a reader could
/// resynchronise after a failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the channel, either between messages or part way
    /// through one.
    #[error("channel closed")]
    Closed,

    /// A request code that this side does not understand.
    #[error("unknown request code {0:#010x}")]
    UnknownRequest(u32),

    /// A response code that this side does not understand.
    #[error("unknown response code {0:#010x}")]
    UnknownResponse(u32),

    /// The subtype field of a data message is not a known object kind.
    #[error("unknown data subtype {0:#010x}")]
    UnknownDataSubtype(u32),

    /// A code other than a node begin or end marker arrived inside a state tree.
    #[error("unexpected code {0:#010x} inside state tree")]
    UnexpectedTreeCode(u32),

    /// A text field was not valid UTF-8.
    #[error("invalid UTF-8 in text field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl CodecError {
    /// Whether the failure was the peer going away rather than a malformed stream
    pub fn is_closed(&self) -> bool {
        match self {
            CodecError::Closed => true,
            CodecError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}
