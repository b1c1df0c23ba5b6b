//! In-process command server
//!
//! This crate is linked into the traced program. Once activated it services
//! the client's requests before the first call, and afterwards checks every
//! intercepted call against the breakpoint table, halting the program's
//! debug thread inside a command loop whenever a breakpoint, single step,
//! interrupt or error event fires.
use eyre::WrapErr;
use transport::{
    env::ChannelSpec,
    io::{BoxedChannel, TcpChannel},
};

mod backend;
mod breakpoints;
mod intercept;
pub mod logging;
mod server;
#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use backend::{Backend, CallId, CallRecord, DEBUGGER_MODULE, ModuleStatus, ObjectError};
pub use breakpoints::BreakpointTable;
pub use intercept::{Interceptor, is_inside_interceptor};
pub use server::{CommandServer, ERROR_CODE, Flow, ServerOptions, Termination};

/// Bring up the server from the environment the launcher prepared
///
/// Opens the channel named by `GLDB_CHANNEL`, then blocks servicing the
/// client until it sends run. A quit request or lost channel during that
/// first exchange ends the process.
#[tracing::instrument(skip(backend))]
pub fn activate<B: Backend>(backend: B) -> eyre::Result<Interceptor<B>> {
    logging::init();

    let spec = ChannelSpec::from_env().wrap_err("reading debugger channel from environment")?;
    tracing::debug!(?spec, "opening debugger channel");
    let channel = open_channel(&spec)?;

    let server = CommandServer::new(backend, channel, ServerOptions::from_env())
        .wrap_err("creating command server")?;
    let interceptor = Interceptor::new(server);
    interceptor.start();
    Ok(interceptor)
}

fn open_channel(spec: &ChannelSpec) -> eyre::Result<BoxedChannel> {
    match *spec {
        #[cfg(unix)]
        ChannelSpec::Fd { input, output } => {
            // SAFETY: the launcher passed these descriptors to us and nothing
            // else in the process knows about them
            let channel = unsafe { transport::io::PipeChannel::from_raw_fds(input, output) }
                .wrap_err("adopting inherited descriptors")?;
            BoxedChannel::from_channel(channel)
        }
        #[cfg(windows)]
        ChannelSpec::Handle { input, output } => {
            // SAFETY: as above, the handles were inherited for our exclusive use
            let channel = unsafe { transport::io::HandleChannel::from_raw_handles(input, output) };
            BoxedChannel::from_channel(channel)
        }
        ChannelSpec::Tcp { ref host, port } => {
            let host = host.as_deref().unwrap_or("0.0.0.0");
            let channel = TcpChannel::accept((host, port)).wrap_err("listening for debugger")?;
            BoxedChannel::from_channel(channel)
        }
        #[allow(unreachable_patterns)]
        ref other => eyre::bail!("{} channels are not supported on this platform", other.kind()),
    }
}
