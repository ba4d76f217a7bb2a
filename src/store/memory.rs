use chrono::Utc;
use std::sync::RwLock;
use uuid::Uuid;

use super::{Message, MessageStore, NewMessage, StoreError};

#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    token_used: String,
}

/// Process-local store. Rows are kept in insertion order, which is also
/// creation-time order.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    rows: RwLock<Vec<StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: Uuid) -> Option<Message> {
        self.rows
            .read()
            .ok()?
            .iter()
            .find(|r| r.message.id == id)
            .map(|r| r.message.clone())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend(anyhow::anyhow!("message store lock poisoned"))
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, new_message: NewMessage) -> Result<Message, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.iter().any(|r| r.token_used == new_message.token_used) {
            return Err(StoreError::DuplicateToken);
        }

        let message = Message {
            id: Uuid::new_v4(),
            message: new_message.message,
            created_at: Utc::now(),
        };
        rows.push(StoredMessage {
            message: message.clone(),
            token_used: new_message.token_used,
        });
        Ok(message)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Message>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(rows
            .iter()
            .rev()
            .take(limit)
            .map(|r| r.message.clone())
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let before = rows.len();
        rows.retain(|r| r.message.id != id);
        Ok(rows.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.rows.read().map(|_| ()).map_err(|_| poisoned())
    }
}
