//! Daemon configuration handling.
//!
//! Configuration is a TOML file with daemon-wide settings and one
//! `[[credential]]` block per managed credential:
//!
//! ```toml
//! log_level = "info"
//!
//! [[credential]]
//! name = "ci-deploy"
//! refresh_before_secs = 300
//! prefetch = "sync"
//!
//! [credential.source]
//! kind = "exec"
//! command = "/usr/local/bin/mint-deploy-token"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokenward_core::{
    CredentialName, DEFAULT_MAX_RETRIES, DEFAULT_REFRESH_BEFORE, DEFAULT_RETRY_AFTER, PrefetchMode,
    RefreshConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to the Unix socket clients connect to.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Credentials the daemon keeps warm.
    #[serde(default, rename = "credential")]
    pub credentials: Vec<CredentialConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_socket_path() -> PathBuf {
    project_dirs()
        .map(|d| {
            d.runtime_dir()
                .unwrap_or(d.data_dir())
                .join("tokenward.sock")
        })
        .unwrap_or_else(|| std::env::temp_dir().join("tokenward.sock"))
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            credentials: Vec::new(),
        }
    }
}

/// One managed credential: its name, refresh policy, and token source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Name clients use to request this credential.
    pub name: CredentialName,

    /// Seconds before expiry at which the proactive refresh runs.
    #[serde(default = "default_refresh_before_secs")]
    pub refresh_before_secs: u64,

    /// Seconds between attempts after a failed background refresh.
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Consecutive failed background attempts before the refresher gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cache population behavior at daemon startup.
    #[serde(default)]
    pub prefetch: PrefetchMode,

    /// Where tokens for this credential come from.
    pub source: SourceConfig,
}

fn default_refresh_before_secs() -> u64 {
    DEFAULT_REFRESH_BEFORE.as_secs()
}

fn default_retry_after_secs() -> u64 {
    DEFAULT_RETRY_AFTER.as_secs()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl CredentialConfig {
    /// Convert the TOML-level settings into a refresh policy.
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            refresh_before: Duration::from_secs(self.refresh_before_secs),
            retry_after: Duration::from_secs(self.retry_after_secs),
            max_retries: self.max_retries,
            prefetch: self.prefetch,
        }
    }
}

/// Token source definition for one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A fixed token value, mostly useful for tests and local development.
    Static {
        token: String,
        #[serde(default = "default_ttl_secs")]
        ttl_secs: u64,
    },

    /// Read the token from an environment variable on every fetch.
    Env {
        var: String,
        #[serde(default = "default_ttl_secs")]
        ttl_secs: u64,
    },

    /// Run a command and use its stdout as the token.
    ///
    /// The command may print either a bare token on one line or a JSON
    /// object `{"token": "...", "expires_at": "<RFC 3339>"}`. For bare
    /// tokens, `ttl_secs` determines the expiry.
    Exec {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_ttl_secs")]
        ttl_secs: u64,
    },
}

fn default_ttl_secs() -> u64 {
    3600
}

/// Load configuration from the given path, the default location, or
/// fall back to defaults when no file exists.
pub fn load_config(path: Option<PathBuf>) -> Result<DaemonConfig> {
    let config_path = match path {
        Some(path) => path,
        None => project_dirs()
            .map(|d| d.config_dir().join("tokenward.toml"))
            .unwrap_or_else(|| PathBuf::from("tokenward.toml")),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        DaemonConfig::default()
    };

    config.config_path = config_path;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "tokenward", "tokenward")
}
