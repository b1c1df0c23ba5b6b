use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use eyre::WrapErr;

/// How long a signalled program gets to exit before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// A spawned traced program (or the ssh process standing in for it)
///
/// The process is terminated when this is dropped.
pub struct TracedProcess {
    child: Child,
}

impl TracedProcess {
    pub(crate) fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Whether the process has exited, without blocking
    pub fn try_wait(&mut self) -> eyre::Result<Option<ExitStatus>> {
        self.child.try_wait().wrap_err("polling traced program")
    }

    pub fn wait(&mut self) -> eyre::Result<ExitStatus> {
        self.child.wait().wrap_err("waiting for traced program")
    }

    /// Ask the process to stop and reap it, killing it if it lingers
    #[tracing::instrument(skip(self), fields(pid = self.child.id()))]
    pub fn terminate(&mut self) -> eyre::Result<()> {
        if self.try_wait()?.is_some() {
            tracing::debug!("traced program already exited");
            return Ok(());
        }
        self.signal()?;

        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if let Some(status) = self.try_wait()? {
                tracing::debug!(%status, "traced program terminated");
                return Ok(());
            }
            thread::sleep(Duration::from_millis(20));
        }

        tracing::warn!("traced program ignored termination request, killing");
        self.child.kill().wrap_err("killing traced program")?;
        self.wait()?;
        Ok(())
    }

    #[cfg(unix)]
    fn signal(&mut self) -> eyre::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = i32::try_from(self.child.id()).wrap_err("process id out of range")?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).wrap_err("sending SIGTERM to traced program")
    }

    #[cfg(not(unix))]
    fn signal(&mut self) -> eyre::Result<()> {
        self.child.kill().wrap_err("killing traced program")
    }
}

impl Drop for TracedProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::warn!(error = %e, "could not terminate traced program");
        }
    }
}
