//! Process wide configuration, read from `~/.config/ldb/config.toml` and command line flags.

use crate::{muted_error, weak_error};
use log::{error, warn};
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8172;

/// Application config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host the debuggee connects to.
    pub host: String,
    pub port: u16,
    /// How long to wait for the other side to show up.
    pub connect_wait: Duration,
    /// How often a stopped debuggee checks the connection.
    pub poll_interval: Duration,
    /// Timeout of a single frame request.
    pub request_timeout: Duration,
    /// Save command history in a regular file.
    pub save_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            save_history: true,
        }
    }
}

/// On-disk layout, every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
    connect_wait_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    save_history: Option<bool>,
}

impl ConfigFile {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.connect_wait_secs {
            config.connect_wait = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(save) = self.save_history {
            config.save_history = save;
        }
    }
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/ldb/config.toml";

    /// Parse a config text, unknown keys are an error.
    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::de::from_str(data)?;
        let mut config = Config::default();
        file.apply(&mut config);
        Ok(config)
    }

    /// Load config from file, the default location if `path` is `None`.
    /// Return defaults on errors.
    pub fn load(path: Option<&Path>) -> Self {
        let data = match path {
            None => {
                let Some(home) = home::home_dir() else {
                    return Config::default();
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Config::default(),
                }
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    error!("Error while load config file {path:?}: {err}");
                    return Config::default();
                }
            },
        };

        weak_error!(Self::from_toml(&data), "invalid config file:").unwrap_or_default()
    }

    /// Path of the command history file.
    pub fn history_path() -> Option<std::path::PathBuf> {
        home::home_dir().map(|home| home.join(".config/ldb/history"))
    }
}

/// Read-only configuration (set only once, at start).
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Set initial configuration.
pub fn set(config: Config) {
    if CONFIG.set(config).is_err() {
        warn!("configuration is already set");
    }
}

/// Return application config, the defaults if nothing is set.
pub fn current() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
