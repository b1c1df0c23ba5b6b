//! Client side of a debugging session
//!
//! A [`Session`] starts the traced program through the launcher, keeps its
//! breakpoint table in sync and follows the program's status from the
//! responses it sends back.
mod render;
mod session;
mod status;

pub use render::render_value;
pub use session::{Incoming, Session};
pub use status::Status;
