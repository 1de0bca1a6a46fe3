//! The client facade and refresher registry.
//!
//! This module provides:
//! - [`TokenKeeper`] - Entry point owning the shared store and one
//!   refresher per credential
//! - [`RefreshEvent`] - Lifecycle notifications for external observers
//!
//! `fetch` is the hot path: a cached, unexpired token is returned straight
//! from the store without touching any refresher. Only cold starts and
//! races with an expiring token pay for a round trip to the owning
//! refresher's mailbox, which serializes concurrent misses into a single
//! source call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TokenError;
use crate::model::{CredentialName, PrefetchMode, RefreshConfig, Token};
use crate::refresher::{Command, Refresher};
use crate::source::TokenSource;
use crate::store::TokenStore;

/// Capacity of each refresher's command mailbox.
const MAILBOX_CAPACITY: usize = 16;

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 64;

/// Lifecycle notifications emitted by refreshers.
///
/// Observers only: the refresh cycle never depends on whether anyone is
/// listening, and a lagging subscriber loses old events rather than slowing
/// refreshes down.
#[derive(Debug, Clone)]
pub enum RefreshEvent {
    /// A fresh token was cached.
    Refreshed {
        name: CredentialName,
        expires_at: DateTime<Utc>,
    },

    /// A background refresh attempt failed; retries remain.
    RefreshFailed {
        name: CredentialName,
        error: String,
        retries_remaining: u32,
    },

    /// A refresher exhausted its retry budget and terminated.
    RefresherStopped { name: CredentialName, error: String },
}

/// A running refresher: its mailbox and its task.
struct RefresherHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Result<(), TokenError>>,
}

/// Owns the shared token store and one background refresher per credential.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chrono::{Duration, Utc};
/// use tokenward_core::{
///     CredentialName, RefreshConfig, Secret, StaticTokenSource, Token, TokenKeeper,
/// };
///
/// # async fn demo() -> Result<(), tokenward_core::TokenError> {
/// let keeper = TokenKeeper::new();
/// let token = Token::new(Secret::new("s3cr3t"), Utc::now() + Duration::hours(1));
/// keeper
///     .start(
///         CredentialName::new("ci"),
///         Arc::new(StaticTokenSource::new(token)),
///         RefreshConfig::default(),
///     )
///     .await?;
///
/// let token = keeper.fetch(&CredentialName::new("ci")).await?;
/// assert_eq!(token.secret.expose(), "s3cr3t");
/// # keeper.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct TokenKeeper {
    store: Arc<TokenStore>,
    refreshers: Mutex<HashMap<CredentialName, RefresherHandle>>,
    events: broadcast::Sender<RefreshEvent>,
}

impl TokenKeeper {
    /// Create a keeper with no credentials.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: Arc::new(TokenStore::new()),
            refreshers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to refresher lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Names of all registered credentials.
    pub fn credential_names(&self) -> Vec<CredentialName> {
        self.store.names()
    }

    /// The cached token for a credential, if one is present.
    ///
    /// Unlike [`fetch`](Self::fetch) this never triggers a fetch; it is a
    /// pure store read.
    pub fn peek(&self, name: &CredentialName) -> Result<Option<Arc<Token>>, TokenError> {
        Ok(self.store.get(name)?.token)
    }

    /// Begin the refresh lifecycle for a credential.
    ///
    /// Registers the name (failing with [`TokenError::AlreadyRegistered`]
    /// on a duplicate) and spawns the background refresher. With
    /// [`PrefetchMode::Sync`] this blocks for exactly one inline fetch
    /// attempt; a prefetch failure is recovered in the background and never
    /// fails `start` itself.
    pub async fn start(
        &self,
        name: CredentialName,
        source: Arc<dyn TokenSource>,
        config: RefreshConfig,
    ) -> Result<(), TokenError> {
        self.store.register(name.clone(), Arc::clone(&source))?;

        let prefetch = config.prefetch;
        let mut refresher = Refresher::new(
            name.clone(),
            source,
            Arc::clone(&self.store),
            config,
            self.events.clone(),
        );
        if prefetch == PrefetchMode::Sync {
            refresher.prefetch_blocking().await;
        }

        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let task = tokio::spawn(refresher.run(mailbox));
        self.refreshers
            .lock()
            .insert(name.clone(), RefresherHandle { commands, task });

        tracing::info!("Credential '{}' registered (prefetch: {})", name, prefetch);
        Ok(())
    }

    /// Get a token for a credential.
    ///
    /// Returns the cached token when it is present and unexpired; otherwise
    /// asks the owning refresher for one (the on-demand path) and waits for
    /// its reply.
    pub async fn fetch(&self, name: &CredentialName) -> Result<Arc<Token>, TokenError> {
        let entry = self.store.get(name)?;
        if let Some(token) = entry.token {
            if !token.is_expired() {
                tracing::debug!("Serving cached token for '{}'", name);
                return Ok(token);
            }
        }

        // Miss: round-trip to the refresher. The sender is cloned out so
        // the registry lock is never held across an await.
        let commands = {
            let refreshers = self.refreshers.lock();
            match refreshers.get(name) {
                Some(handle) => handle.commands.clone(),
                None => return Err(TokenError::RefresherStopped { name: name.clone() }),
            }
        };

        let (reply, response) = oneshot::channel();
        if commands.send(Command::Fetch { reply }).await.is_err() {
            // The refresher terminated (retry budget exhausted).
            return Err(TokenError::RefresherStopped { name: name.clone() });
        }
        match response.await {
            Ok(result) => result,
            Err(_) => Err(TokenError::RefresherStopped { name: name.clone() }),
        }
    }

    /// Stop every refresher and clear the cache. Idempotent.
    ///
    /// Closing a mailbox ends that refresher's select loop, which drops any
    /// armed timer; each task is then awaited so no refresh is left in
    /// flight when this returns.
    pub async fn shutdown(&self) {
        let handles: Vec<(CredentialName, RefresherHandle)> =
            self.refreshers.lock().drain().collect();
        if handles.is_empty() {
            return;
        }

        tracing::info!("Stopping {} refresher(s)", handles.len());
        for (name, handle) in handles {
            drop(handle.commands);
            match handle.task.await {
                // Normal exit, or a fatal exit that was already reported.
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("Refresher task for '{}' panicked: {}", name, err);
                }
            }
        }
        self.store.clear();
    }
}

impl Default for TokenKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeeper")
            .field("credentials", &self.refreshers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Secret;
    use crate::source::StaticTokenSource;

    fn static_source(secret: &str) -> Arc<dyn TokenSource> {
        let token = Token::new(Secret::new(secret), Utc::now() + chrono::Duration::hours(1));
        Arc::new(StaticTokenSource::new(token))
    }

    #[tokio::test]
    async fn test_fetch_unknown_credential_fails() {
        let keeper = TokenKeeper::new();
        let result = keeper.fetch(&CredentialName::new("missing")).await;
        assert!(matches!(result, Err(TokenError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_start_fails() {
        let keeper = TokenKeeper::new();
        let name = CredentialName::new("ci");

        keeper
            .start(name.clone(), static_source("a"), RefreshConfig::default())
            .await
            .unwrap();
        let result = keeper
            .start(name, static_source("b"), RefreshConfig::default())
            .await;

        assert!(matches!(result, Err(TokenError::AlreadyRegistered { .. })));
        keeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let keeper = TokenKeeper::new();
        keeper
            .start(
                CredentialName::new("ci"),
                static_source("a"),
                RefreshConfig::default(),
            )
            .await
            .unwrap();

        keeper.shutdown().await;
        keeper.shutdown().await;

        assert!(keeper.credential_names().is_empty());
    }
}
