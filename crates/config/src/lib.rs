//! User configuration
//!
//! Settings live in a TOML file, by default
//! `<config dir>/cdm-debug/config.toml`. Every key is optional:
//!
//! ```toml
//! ping_interval_ms = 5000
//! ping_timeout_ms = 10000
//! shutdown_timeout_ms = 3000
//! poll_timeout_ms = 10
//! max_payload_size = 16777216
//! connect_retries = 5
//! ignored_exceptions = ["StopIteration", "GeneratorExit"]
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use debugger::SessionConfig;
use eyre::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Idle time before a liveness probe is sent.
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    /// How long a shutdown waits for the debuggee to exit.
    pub shutdown_timeout_ms: u64,
    pub poll_timeout_ms: u64,
    /// Largest payload accepted from the debuggee, in bytes.
    pub max_payload_size: usize,
    pub connect_retries: usize,
    pub ignored_exceptions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            ping_interval_ms: millis(session.ping_interval),
            ping_timeout_ms: millis(session.ping_timeout),
            shutdown_timeout_ms: millis(session.shutdown_timeout),
            poll_timeout_ms: millis(session.poll_timeout),
            max_payload_size: session.max_payload_size,
            connect_retries: session.connect_retries,
            ignored_exceptions: session.ignored_exceptions,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// `config.toml` in the platform configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cdm-debug").join("config.toml"))
    }

    pub fn from_toml(contents: &str) -> eyre::Result<Self> {
        let config = toml::from_str(contents).wrap_err("parsing configuration")?;
        Ok(config)
    }

    /// Read the configuration at `path`; a missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let span = tracing::debug_span!("Config", path = %path.display());
        let _guard = span.enter();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("reading configuration {}", path.display()));
            }
        };
        let config = Self::from_toml(&contents)
            .wrap_err_with(|| format!("loading configuration {}", path.display()))?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Read the configuration from `path` if given, otherwise from the
    /// default location.
    pub fn load(path: Option<&Path>) -> eyre::Result<Self> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load_from(path),
            None => {
                tracing::warn!("no configuration directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            ping_timeout: Duration::from_millis(self.ping_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            max_payload_size: self.max_payload_size,
            connect_retries: self.connect_retries,
            ignored_exceptions: self.ignored_exceptions.clone(),
        }
    }
}

impl From<Config> for SessionConfig {
    fn from(config: Config) -> Self {
        config.session_config()
    }
}
