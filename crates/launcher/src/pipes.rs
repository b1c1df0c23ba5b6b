use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Stdio};

use eyre::WrapErr;
use nix::fcntl::{FcntlArg, FdFlag, OFlag};
use nix::unistd::pipe2;
use transport::env::ChannelSpec;
use transport::io::{BoxedChannel, PipeChannel};

use crate::invocation::Invocation;
use crate::process::TracedProcess;
use crate::settings::ProgramSettings;
use crate::Launched;

/// Two pipes: our ends form the channel, the child's ends are handed over
struct PipePair {
    channel: PipeChannel,
    /// the traced program reads requests from here
    child_in: OwnedFd,
    /// and writes responses here
    child_out: OwnedFd,
}

impl PipePair {
    fn new() -> eyre::Result<Self> {
        // close-on-exec so concurrently spawned processes never inherit them
        let (child_in, requests) = pipe2(OFlag::O_CLOEXEC).wrap_err("creating request pipe")?;
        let (responses, child_out) = pipe2(OFlag::O_CLOEXEC).wrap_err("creating response pipe")?;
        Ok(Self {
            channel: PipeChannel::new(responses, requests),
            child_in,
            child_out,
        })
    }
}

fn launched(channel: PipeChannel, child: Child) -> eyre::Result<Launched> {
    let process = TracedProcess::new(child);
    tracing::debug!(pid = process.pid(), "traced program spawned");
    Ok(Launched {
        channel: BoxedChannel::from_channel(channel)?,
        process: Some(process),
    })
}

pub(crate) fn spawn_local(settings: &ProgramSettings) -> eyre::Result<Launched> {
    let pipes = PipePair::new()?;
    let child_in = pipes.child_in.as_raw_fd();
    let child_out = pipes.child_out.as_raw_fd();
    let spec = ChannelSpec::Fd {
        input: child_in,
        output: child_out,
    };

    let mut command = Invocation::local(settings, &spec)?.command()?;
    // SAFETY: the hook runs between fork and exec and only calls fcntl,
    // which is async-signal-safe; both descriptors stay open until after spawn
    unsafe {
        command.pre_exec(move || {
            for fd in [child_in, child_out] {
                let fd = BorrowedFd::borrow_raw(fd);
                nix::fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
                    .map_err(std::io::Error::from)?;
            }
            Ok(())
        });
    }

    let child = command.spawn().wrap_err("spawning traced program")?;
    // our copies of the child ends close on return, so the channel sees end
    // of stream once the program exits
    launched(pipes.channel, child)
}

pub(crate) fn spawn_ssh(settings: &ProgramSettings) -> eyre::Result<Launched> {
    let PipePair {
        channel,
        child_in,
        child_out,
    } = PipePair::new()?;
    let mut command = Invocation::ssh(settings)?.command()?;
    command
        .stdin(Stdio::from(child_in))
        .stdout(Stdio::from(child_out));

    let child = command.spawn().wrap_err("spawning ssh")?;
    // the command owns the child ends
    drop(command);
    launched(channel, child)
}
