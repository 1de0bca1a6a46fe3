//! The token acquisition seam.
//!
//! This module provides:
//! - [`TokenSource`] - Trait for anything that can produce a fresh token
//! - [`StaticTokenSource`] - Fixed-token implementation for tests and development
//!
//! How a token is actually obtained (identity provider, metadata service,
//! helper process) is entirely the source's business; the refresh machinery
//! only ever sees a token or an opaque error.

use async_trait::async_trait;

use crate::model::Token;

/// Opaque failure produced by a token source.
///
/// Sources are external collaborators; their errors only need to be
/// loggable and displayable, never matched on.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A capability that produces fresh tokens.
///
/// Implementations must be safe to call repeatedly. A source that needs a
/// timeout enforces its own; the refresh machinery waits for whatever the
/// source takes.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a fresh token.
    async fn fetch(&self) -> Result<Token, SourceError>;
}

/// A source that always returns the same token.
///
/// Useful for tests and for development setups where the credential never
/// rotates. Note the expiry is fixed at construction time, so a refresher
/// driving this source will keep re-fetching the same (eventually expired)
/// token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    /// Create a source returning the given token.
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch(&self) -> Result<Token, SourceError> {
        Ok(self.token.clone())
    }
}
