use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Library the dynamic loader injects into a locally or remotely spawned program
pub const DEFAULT_PRELOAD: &str = "libgldb.so";

/// How the traced program is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Spawned through the local shell, talking over inherited pipes
    #[default]
    Local,
    /// Spawned on another host through `ssh`, talking over its stdio
    Ssh,
    /// Already running and listening on a TCP port
    Tcp,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Local => f.write_str("local"),
            TargetKind::Ssh => f.write_str("ssh"),
            TargetKind::Tcp => f.write_str("tcp"),
        }
    }
}

impl FromStr for TargetKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(TargetKind::Local),
            "ssh" => Ok(TargetKind::Ssh),
            "tcp" => Ok(TargetKind::Tcp),
            other => eyre::bail!("unknown target '{other}', expected local, ssh or tcp"),
        }
    }
}

/// Everything needed to start (or reach) a traced program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSettings {
    pub target: TargetKind,
    /// Shell command line of the program to trace
    pub command: Option<String>,
    /// Interception chain forwarded as `GLDB_CHAIN`
    pub chain: Option<String>,
    /// X display for the program
    pub display: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Library put in `LD_PRELOAD`; `None` leaves the loader alone
    pub preload: Option<String>,
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            target: TargetKind::default(),
            command: None,
            chain: None,
            display: None,
            host: None,
            port: None,
            preload: Some(DEFAULT_PRELOAD.to_string()),
        }
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl ProgramSettings {
    /// Check the settings the target kind needs are present
    pub fn validate(&self) -> eyre::Result<()> {
        match self.target {
            TargetKind::Local => {
                eyre::ensure!(is_set(&self.command), "Command not set");
            }
            TargetKind::Ssh => {
                eyre::ensure!(is_set(&self.command), "Command not set");
                eyre::ensure!(is_set(&self.host), "Host not set");
            }
            TargetKind::Tcp => {
                eyre::ensure!(is_set(&self.host), "Host not set");
                eyre::ensure!(self.port.is_some(), "Port not set");
            }
        }
        Ok(())
    }

    pub(crate) fn command(&self) -> eyre::Result<&str> {
        self.command
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| eyre::eyre!("Command not set"))
    }

    pub(crate) fn host(&self) -> eyre::Result<&str> {
        self.host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| eyre::eyre!("Host not set"))
    }
}
