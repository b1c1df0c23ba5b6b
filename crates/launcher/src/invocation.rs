use std::process::Command;

use eyre::WrapErr;
use transport::env::{self, ChannelSpec};

use crate::settings::ProgramSettings;

/// Descriptor numbers the remote shell maps the ssh stdio onto
const REMOTE_FD_IN: i32 = 3;
const REMOTE_FD_OUT: i32 = 4;

/// A program to execute, its arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: &'static str,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Run the command through the local shell with the channel in the environment
    pub fn local(settings: &ProgramSettings, channel: &ChannelSpec) -> eyre::Result<Self> {
        let command = settings.command()?;

        let mut vars = program_env(settings);
        vars.extend(
            channel
                .to_env()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value)),
        );

        Ok(Self {
            program: "sh",
            args: vec!["-c".to_string(), format!("exec {command}")],
            env: vars,
        })
    }

    /// Run the command on another host, tunnelling the channel over ssh's stdio
    ///
    /// The remote shell moves stdin and stdout onto fixed descriptors and
    /// sends the program's own output to stderr, so nothing else is written
    /// into the channel.
    pub fn ssh(settings: &ProgramSettings) -> eyre::Result<Self> {
        let command = settings.command()?;
        let host = settings.host()?;

        let channel = ChannelSpec::Fd {
            input: REMOTE_FD_IN,
            output: REMOTE_FD_OUT,
        };
        let assignments = program_env(settings)
            .into_iter()
            .chain(
                channel
                    .to_env()
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value)),
            )
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        let remote = format!(
            "{assignments} exec {command} {REMOTE_FD_IN}<&0 {REMOTE_FD_OUT}>&1 </dev/null 1>&2"
        );
        Ok(Self {
            program: "ssh",
            args: vec![host.to_string(), remote],
            env: Vec::new(),
        })
    }

    /// Build the process command, resolving the program on `PATH`
    pub fn command(&self) -> eyre::Result<Command> {
        let program = which::which(self.program)
            .wrap_err_with(|| format!("{} not found in PATH", self.program))?;

        let mut command = Command::new(program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(command)
    }
}

/// Variables the traced program needs besides the channel selection
fn program_env(settings: &ProgramSettings) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    if let Some(display) = &settings.display {
        vars.push(("DISPLAY".to_string(), display.clone()));
    }
    if let Some(chain) = &settings.chain {
        vars.push((env::CHAIN.to_string(), chain.clone()));
    }
    if let Some(preload) = &settings.preload {
        vars.push(("LD_PRELOAD".to_string(), preload.clone()));
    }
    vars
}
