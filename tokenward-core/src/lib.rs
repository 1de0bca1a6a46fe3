//! # tokenward-core
//!
//! Single-credential token cache and refresh machinery.
//!
//! This crate provides:
//! - A shared, lock-light token store for low-latency synchronous reads
//! - One background refresher per credential that proactively refreshes
//!   tokens before expiry and retries transient failures against a bounded
//!   budget
//! - A client facade ([`TokenKeeper`]) that serves readers from the cache
//!   and collapses concurrent cold-start fetches into a single source call
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use tokenward_core::{
//!     CredentialName, RefreshConfig, Secret, StaticTokenSource, Token, TokenKeeper,
//! };
//!
//! # async fn demo() -> Result<(), tokenward_core::TokenError> {
//! let keeper = TokenKeeper::new();
//!
//! // Any TokenSource works here; the static one never rotates.
//! let token = Token::new(Secret::new("s3cr3t"), Utc::now() + Duration::hours(1));
//! keeper
//!     .start(
//!         CredentialName::new("ci"),
//!         Arc::new(StaticTokenSource::new(token)),
//!         RefreshConfig::default(),
//!     )
//!     .await?;
//!
//! let token = keeper.fetch(&CredentialName::new("ci")).await?;
//! println!("token expires at {}", token.expires_at);
//! # keeper.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod keeper;
pub mod model;
pub mod source;
pub mod store;

mod refresher;

// Re-export commonly used types at crate root
pub use error::TokenError;

pub use keeper::{RefreshEvent, TokenKeeper};

pub use model::{
    CredentialName, PrefetchMode, RefreshConfig, Secret, Token, DEFAULT_MAX_RETRIES,
    DEFAULT_REFRESH_BEFORE, DEFAULT_RETRY_AFTER,
};

pub use source::{SourceError, StaticTokenSource, TokenSource};

pub use store::{CredentialEntry, TokenStore};
