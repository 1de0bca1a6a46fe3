//! Domain model types for tokenward.
//!
//! This module defines the core types used throughout tokenward:
//! - [`CredentialName`] - Identifier for a managed credential
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`Token`] - An access credential with its expiry
//! - [`PrefetchMode`] - Cache population behavior at refresher startup
//! - [`RefreshConfig`] - Per-credential refresh settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default margin before expiry at which a proactive refresh is scheduled.
pub const DEFAULT_REFRESH_BEFORE: Duration = Duration::from_secs(300);

/// Default spacing between attempts after a failed background refresh.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Default number of consecutive failed attempts before a refresher gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Identifier for a managed credential (e.g., "ci-deploy", "metrics-push").
///
/// Names are normalized to lowercase and are unique within a
/// [`TokenKeeper`](crate::keeper::TokenKeeper).
///
/// # Examples
///
/// ```
/// use tokenward_core::CredentialName;
///
/// let name = CredentialName::new("CI-Deploy");
/// assert_eq!(name.as_str(), "ci-deploy");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct CredentialName(String);

impl CredentialName {
    /// Create a new credential name.
    ///
    /// The name is normalized to lowercase.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CredentialName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CredentialName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the
/// value, and the backing memory is zeroed when the secret is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An access credential with its expiry.
///
/// Tokens are immutable once constructed and are produced only by a
/// [`TokenSource`](crate::source::TokenSource).
#[derive(Debug, Clone)]
pub struct Token {
    /// The credential material.
    pub secret: Secret,

    /// When this token expires.
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Create a new token.
    pub fn new(secret: impl Into<Secret>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Check if this token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Cache population behavior when a refresher starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchMode {
    /// Fetch once inline before `start` returns.
    Sync,

    /// Fetch immediately, but in the background.
    #[default]
    Async,

    /// Leave the cache empty; the first read triggers the fetch.
    Disabled,
}

impl PrefetchMode {
    /// Get the mode as a string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for PrefetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-credential refresh settings.
///
/// `max_retries` bounds *consecutive* background failures: with the default
/// of 3, a credential whose source keeps failing is attempted exactly three
/// times (spaced `retry_after` apart) before its refresher terminates.
/// Values below 1 behave as 1.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How long before expiry a proactive refresh is scheduled.
    pub refresh_before: Duration,

    /// Delay between attempts after a failed background refresh.
    pub retry_after: Duration,

    /// Consecutive failed attempts tolerated before giving up.
    pub max_retries: u32,

    /// Cache population behavior at startup.
    pub prefetch: PrefetchMode,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_before: DEFAULT_REFRESH_BEFORE,
            retry_after: DEFAULT_RETRY_AFTER,
            max_retries: DEFAULT_MAX_RETRIES,
            prefetch: PrefetchMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_name_normalization() {
        let name = CredentialName::new("CI-Deploy");
        assert_eq!(name.as_str(), "ci-deploy");
        assert_eq!(name, CredentialName::from("ci-deploy"));
    }

    #[test]
    fn test_credential_name_deserialization_normalizes() {
        let name: CredentialName = serde_json::from_str(r#""CI-Deploy""#).unwrap();
        assert_eq!(name.as_str(), "ci-deploy");
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_token_is_expired() {
        let expired = Token::new("test", Utc::now() - chrono::Duration::hours(1));
        assert!(expired.is_expired());

        let valid = Token::new("test", Utc::now() + chrono::Duration::hours(1));
        assert!(!valid.is_expired());
    }

    #[test]
    fn test_refresh_config_defaults() {
        let config = RefreshConfig::default();
        assert_eq!(config.refresh_before, Duration::from_secs(300));
        assert_eq!(config.retry_after, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.prefetch, PrefetchMode::Async);
    }
}
