use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Registry of consumed submission tokens.
///
/// Consumption is two-phase so a failed write never burns a token:
/// `reserve` claims the token atomically (insert-if-absent), then the caller
/// either `commit`s it after the write succeeded or `release`s it.
/// A reserved token already counts as present for `contains`.
///
/// Implementations:
/// - InMemoryUsedTokens (single instance)
/// - RedisUsedTokens (shared between instances)
#[async_trait::async_trait]
pub trait UsedTokenStore: Send + Sync {
    /// Whether the token is reserved or used
    async fn contains(&self, token: &str) -> Result<bool>;

    /// Claims the token. Returns `false` if it is already reserved or used.
    /// Must be atomic: of two concurrent callers exactly one gets `true`.
    async fn reserve(&self, token: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    /// Turns a reservation into a permanent entry
    async fn commit(&self, token: &str) -> Result<()>;

    /// Drops a reservation. Committed entries are left alone.
    async fn release(&self, token: &str) -> Result<()>;

    /// Forgets entries whose token expired before `now`.
    /// Returns the number of entries removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    /// Records a token as used without a separate write in between.
    /// Returns `false` if it was already present.
    async fn mark_used(&self, token: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        if self.reserve(token, expires_at).await? {
            self.commit(token).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Reserved,
    Used,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: EntryState,
    expires_at: DateTime<Utc>,
}

/// Process-local registry. The single mutex makes check-and-insert one step.
#[derive(Debug, Default)]
pub struct InMemoryUsedTokens {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryUsedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("used-token registry lock poisoned"))
    }
}

#[async_trait::async_trait]
impl UsedTokenStore for InMemoryUsedTokens {
    async fn contains(&self, token: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(token))
    }

    async fn reserve(&self, token: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.lock()?;
        if entries.contains_key(token) {
            return Ok(false);
        }
        entries.insert(
            token.to_string(),
            Entry {
                state: EntryState::Reserved,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn commit(&self, token: &str) -> Result<()> {
        if let Some(entry) = self.lock()?.get_mut(token) {
            entry.state = EntryState::Used;
        }
        Ok(())
    }

    async fn release(&self, token: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if matches!(entries.get(token), Some(e) if e.state == EntryState::Reserved) {
            entries.remove(token);
        }
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
