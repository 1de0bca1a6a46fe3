//! Error types for token operations.

use thiserror::Error;

use crate::model::CredentialName;

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No credential is registered under the requested name.
    #[error("no credential registered under '{name}'")]
    NotFound { name: CredentialName },

    /// A credential with this name is already registered.
    #[error("credential '{name}' is already registered")]
    AlreadyRegistered { name: CredentialName },

    /// The token source returned an error.
    #[error("fetch for credential '{name}' failed: {message}")]
    FetchFailed {
        name: CredentialName,
        message: String,
    },

    /// Background refresh failed `max_retries` consecutive times.
    ///
    /// This is terminal: the owning refresher stops rather than silently
    /// serving a token it can no longer keep fresh.
    #[error("credential '{name}' exhausted its retry budget: {last_error}")]
    RetryBudgetExhausted {
        name: CredentialName,
        last_error: String,
    },

    /// The refresher for this credential has terminated.
    #[error("refresher for credential '{name}' has stopped")]
    RefresherStopped { name: CredentialName },
}
