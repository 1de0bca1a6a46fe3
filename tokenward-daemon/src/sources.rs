//! Token sources the daemon can construct from configuration.
//!
//! Each [`SourceConfig`] kind maps to one implementation here. Sources
//! are deliberately dumb: they produce a token with an expiry and report
//! failures, while all caching, scheduling, and retry policy lives in
//! the keeper.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokenward_core::{Secret, SourceError, Token, TokenSource};
use tokio::process::Command;
use tracing::debug;

use crate::config::SourceConfig;

/// Build the token source described by a credential's configuration.
pub fn build_source(config: &SourceConfig) -> Arc<dyn TokenSource> {
    match config {
        SourceConfig::Static { token, ttl_secs } => Arc::new(StaticSource {
            token: Secret::new(token.clone()),
            ttl: Duration::from_secs(*ttl_secs),
        }),
        SourceConfig::Env { var, ttl_secs } => Arc::new(EnvSource {
            var: var.clone(),
            ttl: Duration::from_secs(*ttl_secs),
        }),
        SourceConfig::Exec {
            command,
            args,
            ttl_secs,
        } => Arc::new(ExecSource {
            command: command.clone(),
            args: args.clone(),
            ttl: Duration::from_secs(*ttl_secs),
        }),
    }
}

/// A fixed token value.
///
/// Unlike [`StaticTokenSource`](tokenward_core::StaticTokenSource), which
/// returns one token with one fixed expiry, this source stamps a new
/// expiry on every fetch so the credential never goes permanently stale.
struct StaticSource {
    token: Secret,
    ttl: Duration,
}

#[async_trait]
impl TokenSource for StaticSource {
    async fn fetch(&self) -> Result<Token, SourceError> {
        Ok(Token::new(self.token.clone(), expiry(self.ttl)?))
    }
}

/// Reads the token from an environment variable on every fetch.
struct EnvSource {
    var: String,
    ttl: Duration,
}

#[async_trait]
impl TokenSource for EnvSource {
    async fn fetch(&self) -> Result<Token, SourceError> {
        let value = std::env::var(&self.var)
            .map_err(|e| format!("environment variable '{}': {}", self.var, e))?;
        Ok(Token::new(Secret::new(value), expiry(self.ttl)?))
    }
}

/// Runs a command and uses its stdout as the token.
struct ExecSource {
    command: String,
    args: Vec<String>,
    ttl: Duration,
}

/// JSON shape an exec source may print instead of a bare token.
#[derive(Debug, Deserialize)]
struct ExecOutput {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl TokenSource for ExecSource {
    async fn fetch(&self) -> Result<Token, SourceError> {
        debug!("running token command '{}'", self.command);
        let output = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("token command '{}' failed to start: {}", self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "token command '{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )
            .into());
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| format!("token command '{}' produced non-UTF-8 output", self.command))?;
        parse_exec_output(&stdout, self.ttl)
    }
}

/// Interpret exec output as either a JSON object or a bare token line.
fn parse_exec_output(stdout: &str, ttl: Duration) -> Result<Token, SourceError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err("token command produced no output".into());
    }

    if trimmed.starts_with('{') {
        let parsed: ExecOutput = serde_json::from_str(trimmed)?;
        let expires_at = match parsed.expires_at {
            Some(at) => at,
            None => expiry(ttl)?,
        };
        return Ok(Token::new(Secret::new(parsed.token), expires_at));
    }

    let token = match trimmed.lines().next() {
        Some(line) => line.trim(),
        None => trimmed,
    };
    Ok(Token::new(Secret::new(token), expiry(ttl)?))
}

fn expiry(ttl: Duration) -> Result<DateTime<Utc>, SourceError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| format!("credential ttl out of range: {}", e))?;
    Ok(Utc::now() + ttl)
}
