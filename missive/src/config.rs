//! Runtime configuration, read from a RON file.

use std::path::{Path, PathBuf};

use missive_common::logging::LoggingConfig;
use missive_delivery::{DnsConfig, SendQuota, ThrottleConfig};
use serde::Deserialize;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "MISSIVE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// From header used when a message does not carry its own
    #[serde(default)]
    pub sender: String,

    /// Base of the web unsubscribe link, e.g. `https://api.example.org/v1`
    pub api_base_url: String,

    /// Mailbox that receives `mailto:` unsubscribe requests
    pub unsubscribe_email: String,

    /// JSON file of subscriber records to load into the store
    #[serde(default)]
    pub subscribers: Option<PathBuf>,

    /// JSON file of suppressed addresses, kept across runs
    #[serde(default)]
    pub suppressions: Option<PathBuf>,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Sending limits reported to the throttle during dry runs
    #[serde(default = "default_quota")]
    pub quota: SendQuota,

    /// Directory that receives rendered messages (default: `./outbox`)
    #[serde(default = "default_outbox")]
    pub outbox: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_quota() -> SendQuota {
    SendQuota {
        max_send_rate: 1.0,
        max_24_hour_send: 200,
        sent_last_24_hours: 0,
    }
}

fn default_outbox() -> PathBuf {
    PathBuf::from("./outbox")
}

impl Config {
    /// Parse a configuration file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not valid RON for this structure.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from RON text.
    ///
    /// # Errors
    ///
    /// If `content` is not valid RON for this structure.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `MISSIVE_CONFIG` environment variable
/// 2. ./missive.config.ron (current working directory)
/// 3. /etc/missive/missive.config.ron (system-wide config)
///
/// # Errors
///
/// If `MISSIVE_CONFIG` names a missing file, or no candidate exists.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./missive.config.ron"),
        PathBuf::from("/etc/missive/missive.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
