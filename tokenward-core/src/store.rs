//! Shared token store.
//!
//! A process-wide keyed cache mapping credential names to their source and
//! most recent token. Reads and writes are atomic per credential: the lock
//! is held only for map operations and pointer swaps, never across an await
//! point, and the cached token is replaced wholesale so readers observe
//! either the old or the new value, never a partial one.
//!
//! Only the owning refresher writes tokens; arbitrarily many readers may
//! call [`TokenStore::get`] concurrently without contending with an
//! in-flight refresh.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TokenError;
use crate::model::{CredentialName, Token};
use crate::source::TokenSource;

/// A registered credential: its source and the most recent token, if any.
#[derive(Clone)]
pub struct CredentialEntry {
    /// The source tokens come from. Write-once at registration.
    pub source: Arc<dyn TokenSource>,

    /// The most recent token, or `None` before the first successful fetch
    /// (and again after the refresher terminates).
    pub token: Option<Arc<Token>>,
}

/// Process-wide keyed token cache.
#[derive(Default)]
pub struct TokenStore {
    entries: RwLock<HashMap<CredentialName, CredentialEntry>>,
}

impl TokenStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential with an empty cache slot.
    ///
    /// Fails with [`TokenError::AlreadyRegistered`] if the name is taken;
    /// name uniqueness is enforced here, at refresher startup time.
    pub fn register(
        &self,
        name: CredentialName,
        source: Arc<dyn TokenSource>,
    ) -> Result<(), TokenError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(TokenError::AlreadyRegistered { name });
        }
        entries.insert(name, CredentialEntry { source, token: None });
        Ok(())
    }

    /// Get a credential's source and cached token.
    pub fn get(&self, name: &CredentialName) -> Result<CredentialEntry, TokenError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TokenError::NotFound { name: name.clone() })
    }

    /// Replace the cached token, preserving the registered source.
    ///
    /// Only the credential's owning refresher calls this.
    pub fn put(&self, name: &CredentialName, token: Option<Arc<Token>>) -> Result<(), TokenError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.token = token;
                Ok(())
            }
            None => Err(TokenError::NotFound { name: name.clone() }),
        }
    }

    /// Names of all registered credentials.
    pub fn names(&self) -> Vec<CredentialName> {
        self.entries.read().keys().cloned().collect()
    }

    /// Remove every entry. Called at keeper teardown.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("credentials", &self.entries.read().len())
            .finish()
    }
}
