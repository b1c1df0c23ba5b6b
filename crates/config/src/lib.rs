//! User configuration for the command-line debugger
//!
//! Read from `$XDG_CONFIG_HOME/gldb/config.toml`. Every key is optional and
//! a missing file is the same as an empty one.
//!
//! ```toml
//! [program]
//! target = "local"
//! command = "./demo --fullscreen"
//! chain = "trace"
//!
//! [breakpoints]
//! functions = ["glDrawElements"]
//! events = { link-error = false }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use launcher::{ProgramSettings, TargetKind};
use serde::{Deserialize, Serialize};
use transport::EventKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub program: ProgramConfig,
    pub breakpoints: BreakpointConfig,
}

/// Defaults for how the traced program is started
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgramConfig {
    pub target: Option<TargetKind>,
    pub command: Option<String>,
    pub chain: Option<String>,
    pub display: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Library to preload; an empty string disables preloading
    pub preload: Option<String>,
}

/// Breakpoints set before the program is first run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakpointConfig {
    pub functions: Vec<String>,
    /// Keyed by event name; events not listed keep their default of breaking
    pub events: BTreeMap<String, bool>,
}

impl BreakpointConfig {
    /// The event flags, with names checked
    pub fn event_flags(&self) -> eyre::Result<Vec<(EventKind, bool)>> {
        self.events
            .iter()
            .map(|(name, enabled)| {
                let event = name
                    .parse::<EventKind>()
                    .wrap_err_with(|| format!("unknown event '{name}' in [breakpoints]"))?;
                Ok((event, *enabled))
            })
            .collect()
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/gldb/config.toml`, or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gldb").join("config.toml"))
    }

    /// Load from the default location
    pub fn load() -> eyre::Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => {
                tracing::debug!("no configuration directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .wrap_err_with(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!("configuration loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err("creating config directory")?;
        }
        let content = toml::to_string_pretty(self).wrap_err("serialising configuration")?;
        fs::write(path, content)
            .wrap_err_with(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    /// Launch settings from the file, before command-line overrides
    pub fn program_settings(&self) -> ProgramSettings {
        let program = &self.program;
        let mut settings = ProgramSettings {
            target: program.target.unwrap_or_default(),
            command: program.command.clone(),
            chain: program.chain.clone(),
            display: program.display.clone(),
            host: program.host.clone(),
            port: program.port,
            ..Default::default()
        };
        if let Some(preload) = &program.preload {
            settings.preload = (!preload.is_empty()).then(|| preload.clone());
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::load_from(dir.path().join("config.toml"))?;
        assert_eq!(config, Config::default());
        assert_eq!(config.program_settings(), ProgramSettings::default());
        Ok(())
    }

    #[test]
    fn reads_program_and_breakpoints() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[program]
target = "ssh"
command = "./demo"
host = "render-box"
preload = ""

[breakpoints]
functions = ["glDrawElements", "glFlush"]
events = { link-error = false }
"#,
        )?;

        let config = Config::load_from(&path)?;
        assert_eq!(
            config.breakpoints.functions,
            vec!["glDrawElements".to_string(), "glFlush".to_string()]
        );
        assert_eq!(
            config.breakpoints.event_flags()?,
            vec![(EventKind::LinkError, false)]
        );

        let settings = config.program_settings();
        assert_eq!(settings.target, TargetKind::Ssh);
        assert_eq!(settings.command.as_deref(), Some("./demo"));
        assert_eq!(settings.host.as_deref(), Some("render-box"));
        assert_eq!(settings.preload, None);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "[program]\ncomand = \"typo\"\n")?;

        let err = Config::load_from(&path).expect_err("typo should not be ignored");
        assert!(err.to_string().contains("parsing config file"));
        Ok(())
    }

    #[test]
    fn unknown_event_names_are_reported() {
        let mut config = BreakpointConfig::default();
        config.events.insert("vertex-error".to_string(), true);
        let err = config.event_flags().expect_err("no such event");
        assert!(err.to_string().contains("vertex-error"));
    }

    #[test]
    fn saved_config_loads_back() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.program.target = Some(TargetKind::Tcp);
        config.program.port = Some(9200);
        config.breakpoints.events.insert("error".to_string(), false);

        config.save_to(&path)?;
        assert_eq!(Config::load_from(&path)?, config);
        Ok(())
    }
}
