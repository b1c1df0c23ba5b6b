//! Environment variables that tell a traced program how to reach its client

use std::fmt;
use std::str::FromStr;

use eyre::{Context, Result};

pub const CHANNEL: &str = "GLDB_CHANNEL";
pub const FD_IN: &str = "GLDB_FD_IN";
pub const FD_OUT: &str = "GLDB_FD_OUT";
pub const HANDLE_IN: &str = "GLDB_HANDLE_IN";
pub const HANDLE_OUT: &str = "GLDB_HANDLE_OUT";
pub const HOST: &str = "GLDB_HOST";
pub const PORT: &str = "GLDB_PORT";
pub const LOG: &str = "GLDB_LOG";
pub const CHAIN: &str = "GLDB_CHAIN";
pub const STOP_IN_ATOMIC_BLOCK: &str = "GLDB_STOP_IN_ATOMIC_BLOCK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Fd,
    Handle,
    Tcp,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelKind::Fd => "fd",
            ChannelKind::Handle => "handle",
            ChannelKind::Tcp => "tcp",
        })
    }
}

impl FromStr for ChannelKind {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fd" => Ok(Self::Fd),
            "handle" => Ok(Self::Handle),
            "tcp" => Ok(Self::Tcp),
            other => Err(eyre::eyre!("did not recognise {CHANNEL} value '{other}'")),
        }
    }
}

/// Where the in-process server finds its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSpec {
    /// Inherited descriptors: requests arrive on `input`, responses leave on `output`
    Fd { input: i32, output: i32 },
    Handle { input: usize, output: usize },
    /// Listen on `host:port`; all interfaces when no host is given
    Tcp { host: Option<String>, port: u16 },
}

impl ChannelSpec {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelSpec::Fd { .. } => ChannelKind::Fd,
            ChannelSpec::Handle { .. } => ChannelKind::Handle,
            ChannelSpec::Tcp { .. } => ChannelKind::Tcp,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse the channel variables using `lookup` to read each one
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let kind: ChannelKind = lookup(CHANNEL)
            .ok_or_else(|| eyre::eyre!("{CHANNEL} is not set; the debugger must be started by gldb"))?
            .parse()?;

        let required = |name: &str| {
            lookup(name).ok_or_else(|| eyre::eyre!("{name} must be set when {CHANNEL}={kind}"))
        };

        let spec = match kind {
            ChannelKind::Fd => ChannelSpec::Fd {
                input: parse_number(FD_IN, &required(FD_IN)?)?,
                output: parse_number(FD_OUT, &required(FD_OUT)?)?,
            },
            ChannelKind::Handle => ChannelSpec::Handle {
                input: parse_number(HANDLE_IN, &required(HANDLE_IN)?)?,
                output: parse_number(HANDLE_OUT, &required(HANDLE_OUT)?)?,
            },
            ChannelKind::Tcp => ChannelSpec::Tcp {
                host: lookup(HOST).filter(|host| !host.is_empty()),
                port: parse_number(PORT, &required(PORT)?)?,
            },
        };
        Ok(spec)
    }

    /// The variable assignments that select this channel in a child process
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![(CHANNEL, self.kind().to_string())];
        match self {
            ChannelSpec::Fd { input, output } => {
                vars.push((FD_IN, input.to_string()));
                vars.push((FD_OUT, output.to_string()));
            }
            ChannelSpec::Handle { input, output } => {
                vars.push((HANDLE_IN, input.to_string()));
                vars.push((HANDLE_OUT, output.to_string()));
            }
            ChannelSpec::Tcp { host, port } => {
                if let Some(host) = host {
                    vars.push((HOST, host.clone()));
                }
                vars.push((PORT, port.to_string()));
            }
        }
        vars
    }
}

fn parse_number<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("illegal {name}: '{value}'"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn parses_fd_channel() -> Result<()> {
        let spec = ChannelSpec::from_lookup(lookup_in(&[
            (CHANNEL, "fd"),
            (FD_IN, "5"),
            (FD_OUT, "8"),
        ]))?;
        assert_eq!(spec, ChannelSpec::Fd { input: 5, output: 8 });
        Ok(())
    }

    #[test]
    fn round_trips_through_env() -> Result<()> {
        let spec = ChannelSpec::Tcp {
            host: Some("0.0.0.0".to_string()),
            port: 9118,
        };
        let env = spec.to_env();
        let pairs: Vec<(&str, &str)> = env.iter().map(|(k, v)| (*k, v.as_str())).collect();
        assert_eq!(ChannelSpec::from_lookup(lookup_in(&pairs))?, spec);
        Ok(())
    }

    #[test]
    fn reports_bad_values() {
        let err = ChannelSpec::from_lookup(lookup_in(&[(CHANNEL, "pipe")])).unwrap_err();
        assert!(err.to_string().contains("did not recognise"));

        let err = ChannelSpec::from_lookup(lookup_in(&[(CHANNEL, "tcp")])).unwrap_err();
        assert!(err.to_string().contains(PORT));

        let err = ChannelSpec::from_lookup(lookup_in(&[
            (CHANNEL, "fd"),
            (FD_IN, "three"),
            (FD_OUT, "4"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "illegal GLDB_FD_IN: 'three'");

        assert!(ChannelSpec::from_lookup(lookup_in(&[])).is_err());
    }
}
