// ============================================================================
// Message Store
// ============================================================================
//
// Append / list / delete over sanitized messages. The token that authorized a
// row is kept in a unique column as a second guard against double
// submission; it never leaves the store.
//
// Implementations:
// - PostgresMessageStore (DATABASE_URL set)
// - InMemoryMessageStore (development and tests)
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::{create_pool, DbPool, PostgresMessageStore};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A stored message as returned to readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Row to insert. `message` is already sanitized.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message: String,
    pub token_used: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The authorizing token is already attached to a stored row
    #[error("token already attached to a stored message")]
    DuplicateToken,

    #[error("message store failure: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, new_message: NewMessage) -> Result<Message, StoreError>;

    /// Newest first, at most `limit` rows
    async fn list_recent(&self, limit: i64) -> Result<Vec<Message>, StoreError>;

    /// Returns `false` if no row had this id
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
