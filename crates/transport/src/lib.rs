//! Wire protocol for the remote GL debugger
//!
//! This crate contains everything both ends of a debugging session agree on:
//! the binary codec, the typed request and response messages, state tree
//! streaming, the [`Channel`] abstraction over pipes, sockets and in-memory
//! pairs, and the bounded [`CommandQueue`] that moves decoded requests off the
//! reader thread.
pub mod bindings;
pub mod codec;
pub mod env;
mod error;
pub mod io;
pub mod message;
pub mod queue;
pub mod tree;

pub use error::CodecError;
pub use io::Channel;
pub use message::{
    CorrelationId, DataKind, DataRequest, DataResponse, EventKind, Request, RequestBody, Response,
    ResponseBody,
};
pub use queue::CommandQueue;
pub use tree::{StateCursor, StateNode, StateValue};

/// The default port a traced program listens on in TCP mode
pub const DEFAULT_PORT: u16 = 9118;
