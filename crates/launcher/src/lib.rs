//! Starting a traced program and opening the debugger channel to it
//!
//! A local program is spawned through `sh` with two inherited pipes, a remote
//! one through `ssh` with the pipes on its stdio, and a program that is
//! already listening is reached over TCP. In every case the channel exists
//! before the program can send anything, so no message is lost.

use eyre::WrapErr;
use transport::io::{BoxedChannel, TcpChannel};

mod backtrace;
mod invocation;
#[cfg(unix)]
mod pipes;
mod process;
mod settings;

pub use backtrace::backtrace;
pub use invocation::Invocation;
pub use process::TracedProcess;
pub use settings::{DEFAULT_PRELOAD, ProgramSettings, TargetKind};

/// A channel to the traced program, and the process if we spawned one
pub struct Launched {
    pub channel: BoxedChannel,
    pub process: Option<TracedProcess>,
}

/// Start or connect to the program described by `settings`
#[tracing::instrument(skip(settings), fields(target = %settings.target))]
pub fn launch(settings: &ProgramSettings) -> eyre::Result<Launched> {
    settings.validate()?;

    match settings.target {
        TargetKind::Local => spawn_local(settings),
        TargetKind::Ssh => spawn_ssh(settings),
        TargetKind::Tcp => connect(settings),
    }
}

fn connect(settings: &ProgramSettings) -> eyre::Result<Launched> {
    let host = settings.host()?;
    let port = settings
        .port
        .ok_or_else(|| eyre::eyre!("Port not set"))?;

    tracing::debug!(%host, port, "connecting to traced program");
    let channel = TcpChannel::connect((host, port))
        .wrap_err_with(|| format!("connecting to {host}:{port}"))?;
    Ok(Launched {
        channel: BoxedChannel::from_channel(channel)?,
        process: None,
    })
}

#[cfg(unix)]
fn spawn_local(settings: &ProgramSettings) -> eyre::Result<Launched> {
    pipes::spawn_local(settings)
}

#[cfg(unix)]
fn spawn_ssh(settings: &ProgramSettings) -> eyre::Result<Launched> {
    pipes::spawn_ssh(settings)
}

#[cfg(not(unix))]
fn spawn_local(settings: &ProgramSettings) -> eyre::Result<Launched> {
    eyre::bail!("{} targets are not supported on this platform", settings.target)
}

#[cfg(not(unix))]
fn spawn_ssh(settings: &ProgramSettings) -> eyre::Result<Launched> {
    eyre::bail!("{} targets are not supported on this platform", settings.target)
}
