use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{clog_debug, Error, Result};

/// Default number of concurrent workers per team.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default number of shutdown re-issues before a worker is force-terminated.
pub const DEFAULT_SHUTDOWN_RETRY_LIMIT: u32 = 3;

/// Default window without any worker signal before it is treated as unresponsive.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Default interval at which executing workers emit heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Default cap on inline notification payloads; larger data travels as artifacts.
pub const DEFAULT_INLINE_PAYLOAD_CAP: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_shutdown_retry_limit")]
    pub shutdown_retry_limit: u32,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_inline_payload_cap")]
    pub inline_payload_cap: usize,
    pub artifact_dir: Option<String>,
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_shutdown_retry_limit() -> u32 {
    DEFAULT_SHUTDOWN_RETRY_LIMIT
}

fn default_heartbeat_timeout_secs() -> u64 {
    DEFAULT_HEARTBEAT_TIMEOUT_SECS
}

fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_inline_payload_cap() -> usize {
    DEFAULT_INLINE_PAYLOAD_CAP
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            shutdown_retry_limit: DEFAULT_SHUTDOWN_RETRY_LIMIT,
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            inline_payload_cap: DEFAULT_INLINE_PAYLOAD_CAP,
            artifact_dir: None,
        }
    }
}

impl Config {
    pub fn crew_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".crew"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::crew_dir()?.join("crew.toml"))
    }

    /// Root directory for the filesystem artifact store.
    pub fn artifacts_dir(&self) -> Result<PathBuf> {
        match &self.artifact_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::crew_dir()?.join("artifacts")),
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        clog_debug!(
            "Config loaded: max_workers={}, shutdown_retry_limit={}, heartbeat_timeout={}s",
            config.max_workers,
            config.shutdown_retry_limit,
            config.heartbeat_timeout_secs
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let crew_dir = Self::crew_dir()?;
        clog_debug!("Config::save crew_dir={}", crew_dir.display());
        if !crew_dir.exists() {
            fs::create_dir_all(&crew_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let crew_dir = Self::crew_dir()?;
        let artifacts_dir = self.artifacts_dir()?;
        clog_debug!(
            "Config::ensure_dirs crew={} artifacts={}",
            crew_dir.display(),
            artifacts_dir.display()
        );
        if !crew_dir.exists() {
            fs::create_dir_all(&crew_dir)?;
        }
        if !artifacts_dir.exists() {
            fs::create_dir_all(&artifacts_dir)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
