//! The background refresh actor.
//!
//! One refresher task runs per registered credential. It is the sole writer
//! of that credential's cache slot and exclusively owns the retry state and
//! the refresh timer, so the state machine needs no locks: everything
//! happens in a single `select!` loop over an optionally armed timer and a
//! command mailbox.
//!
//! The actor moves through four states:
//! - *Idle*: no timer armed (prefetch disabled, before the first read)
//! - *Scheduled*: a proactive refresh timer is armed
//! - *Retrying*: a fetch failed and a bounded-retry timer is armed
//! - *Fatal*: the retry budget is exhausted; the task terminates
//!
//! Client-facing reads never enter this module on the cache-hit path; only
//! cache misses are routed here, as [`Command::Fetch`] messages.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::error::TokenError;
use crate::keeper::RefreshEvent;
use crate::model::{CredentialName, PrefetchMode, RefreshConfig, Token};
use crate::source::TokenSource;
use crate::store::TokenStore;

/// Commands accepted by a refresher's mailbox.
pub(crate) enum Command {
    /// Fetch a token now and reply with the outcome.
    Fetch {
        reply: oneshot::Sender<Result<Arc<Token>, TokenError>>,
    },
}

/// The per-credential refresh state machine.
///
/// Constructed by the keeper, then moved into its own task via
/// [`Refresher::run`]. All fields are private actor state; nothing here is
/// shared.
pub(crate) struct Refresher {
    name: CredentialName,
    source: Arc<dyn TokenSource>,
    store: Arc<TokenStore>,
    config: RefreshConfig,
    events: broadcast::Sender<RefreshEvent>,
    retries_remaining: u32,
    deadline: Option<Instant>,
}

impl Refresher {
    pub(crate) fn new(
        name: CredentialName,
        source: Arc<dyn TokenSource>,
        store: Arc<TokenStore>,
        config: RefreshConfig,
        events: broadcast::Sender<RefreshEvent>,
    ) -> Self {
        let deadline = match config.prefetch {
            // The first fetch happens as a deferred action, right away.
            PrefetchMode::Async => Some(Instant::now()),
            // Sync prefetch runs inline via `prefetch_blocking` and arms
            // its own deadline; disabled leaves the actor idle until the
            // first read.
            PrefetchMode::Sync | PrefetchMode::Disabled => None,
        };
        let retries_remaining = config.max_retries;
        Self {
            name,
            source,
            store,
            config,
            events,
            retries_remaining,
            deadline,
        }
    }

    /// One inline fetch, for [`PrefetchMode::Sync`].
    ///
    /// Blocks the `start` caller for exactly one fetch attempt. Failure is
    /// not an error for `start`: the cache stays empty, an immediate
    /// background refresh is armed, and the retry budget is untouched (the
    /// budget belongs to the background cycle).
    pub(crate) async fn prefetch_blocking(&mut self) {
        match self.source.fetch().await {
            Ok(token) => self.store_fresh(Arc::new(token)),
            Err(err) => {
                tracing::warn!(
                    "Synchronous prefetch for '{}' failed, recovering in background: {}",
                    self.name,
                    err
                );
                self.deadline = Some(Instant::now());
            }
        }
    }

    /// The actor loop. Runs until the mailbox closes (keeper shutdown) or
    /// the retry budget is exhausted.
    ///
    /// The terminal error is also the task's return value, so the keeper
    /// can observe *why* a refresher stopped when it joins the task.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<(), TokenError> {
        tracing::debug!(
            "Refresher for '{}' running (prefetch: {})",
            self.name,
            self.config.prefetch
        );

        loop {
            tokio::select! {
                _ = wait_until(self.deadline) => {
                    self.refresh_and_reschedule().await?;
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::Fetch { reply }) => {
                        self.fetch_on_demand(reply, &mut commands).await;
                    }
                    None => {
                        tracing::debug!(
                            "Mailbox for '{}' closed, refresher stopping",
                            self.name
                        );
                        return Ok(());
                    }
                },
            }
        }
    }

    /// A timer fired: perform the scheduled or retry fetch.
    ///
    /// On success the budget resets and the next proactive refresh is
    /// armed. On failure the budget is decremented and a retry armed until
    /// exhausted, at which point the cached token is cleared and the error
    /// escalates out of the actor loop.
    async fn refresh_and_reschedule(&mut self) -> Result<(), TokenError> {
        match self.source.fetch().await {
            Ok(token) => {
                self.store_fresh(Arc::new(token));
                Ok(())
            }
            Err(err) => {
                if self.retries_remaining > 1 {
                    self.retries_remaining -= 1;
                    self.deadline = Some(Instant::now() + self.config.retry_after);
                    tracing::warn!(
                        "Refresh for '{}' failed ({} retries remaining): {}",
                        self.name,
                        self.retries_remaining,
                        err
                    );
                    let _ = self.events.send(RefreshEvent::RefreshFailed {
                        name: self.name.clone(),
                        error: err.to_string(),
                        retries_remaining: self.retries_remaining,
                    });
                    Ok(())
                } else {
                    tracing::error!(
                        "Refresh for '{}' failed after {} attempts, giving up: {}",
                        self.name,
                        self.config.max_retries,
                        err
                    );
                    // An unrefreshable token must not keep being served;
                    // readers now fail fast instead. The put only misses if
                    // the keeper is already tearing the entry down.
                    let _ = self.store.put(&self.name, None);
                    let _ = self.events.send(RefreshEvent::RefresherStopped {
                        name: self.name.clone(),
                        error: err.to_string(),
                    });
                    Err(TokenError::RetryBudgetExhausted {
                        name: self.name.clone(),
                        last_error: err.to_string(),
                    })
                }
            }
        }
    }

    /// Serve an on-demand fetch request from the facade.
    ///
    /// Every request queued in the mailbox is collapsed into one source
    /// call: concurrent cold-start readers all receive the outcome of a
    /// single fetch rather than fanning out into a thundering herd. A
    /// failure is the callers' to handle; the background retry budget and
    /// any armed timer stay exactly as they were.
    async fn fetch_on_demand(
        &mut self,
        reply: oneshot::Sender<Result<Arc<Token>, TokenError>>,
        commands: &mut mpsc::Receiver<Command>,
    ) {
        let mut waiters = vec![reply];
        while let Ok(Command::Fetch { reply }) = commands.try_recv() {
            waiters.push(reply);
        }

        // A scheduled refresh may have landed between the caller's cache
        // miss and this command; answer from the cache if it did.
        if let Ok(entry) = self.store.get(&self.name) {
            if let Some(token) = entry.token {
                if !token.is_expired() {
                    tracing::debug!("On-demand fetch for '{}' served from cache", self.name);
                    for waiter in waiters {
                        let _ = waiter.send(Ok(Arc::clone(&token)));
                    }
                    return;
                }
            }
        }

        tracing::debug!(
            "On-demand fetch for '{}' ({} waiting)",
            self.name,
            waiters.len()
        );
        match self.source.fetch().await {
            Ok(token) => {
                let token = Arc::new(token);
                // An on-demand success counts like a scheduled one: cache
                // it, restore the budget, move the schedule to the new
                // expiry.
                self.store_fresh(Arc::clone(&token));
                for waiter in waiters {
                    let _ = waiter.send(Ok(Arc::clone(&token)));
                }
            }
            Err(err) => {
                tracing::warn!("On-demand fetch for '{}' failed: {}", self.name, err);
                let message = err.to_string();
                for waiter in waiters {
                    let _ = waiter.send(Err(TokenError::FetchFailed {
                        name: self.name.clone(),
                        message: message.clone(),
                    }));
                }
            }
        }
    }

    /// Cache a fresh token, reset the retry budget, and arm the next
    /// proactive refresh.
    fn store_fresh(&mut self, token: Arc<Token>) {
        let expires_at = token.expires_at;
        // The put only misses mid-teardown, when the mailbox is about to
        // close anyway.
        let _ = self.store.put(&self.name, Some(token));
        self.retries_remaining = self.config.max_retries;

        let delay = refresh_delay(expires_at, self.config.refresh_before);
        self.deadline = Some(Instant::now() + delay);

        tracing::info!(
            "Token for '{}' refreshed, expires at {}, next refresh in {}s",
            self.name,
            expires_at,
            delay.as_secs()
        );
        let _ = self.events.send(RefreshEvent::Refreshed {
            name: self.name.clone(),
            expires_at,
        });
    }
}

/// Sleeps until the deadline, or forever when none is armed.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Delay until the proactive refresh of a token expiring at `expires_at`:
/// `expires_at - now - refresh_before`, clamped to zero once the margin has
/// already passed.
fn refresh_delay(expires_at: DateTime<Utc>, refresh_before: Duration) -> Duration {
    let Ok(margin) = chrono::Duration::from_std(refresh_before) else {
        // A margin too large for the calendar means "refresh immediately".
        return Duration::ZERO;
    };
    (expires_at - Utc::now() - margin).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_delay_before_margin() {
        let expires_at = Utc::now() + chrono::Duration::seconds(100);
        let delay = refresh_delay(expires_at, Duration::from_secs(10));

        // ~90s, allowing for the wall clock moving between the two now() reads.
        assert!(delay > Duration::from_secs(89), "delay was {delay:?}");
        assert!(delay <= Duration::from_secs(90), "delay was {delay:?}");
    }

    #[test]
    fn test_refresh_delay_clamps_to_zero() {
        let expires_at = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(refresh_delay(expires_at, Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_refresh_delay_for_expired_token_is_zero() {
        let expires_at = Utc::now() - chrono::Duration::seconds(5);
        assert_eq!(refresh_delay(expires_at, Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_refresh_delay_oversized_margin_is_zero() {
        let expires_at = Utc::now() + chrono::Duration::seconds(100);
        assert_eq!(refresh_delay(expires_at, Duration::MAX), Duration::ZERO);
    }
}
