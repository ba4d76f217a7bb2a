use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{Message, MessageStore, NewMessage, StoreError};

pub type DbPool = Pool<Postgres>;

pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: DbPool,
}

impl PostgresMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Applies the migrations under `./migrations`.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

#[async_trait::async_trait]
impl MessageStore for PostgresMessageStore {
    async fn create(&self, new_message: NewMessage) -> Result<Message, StoreError> {
        let result = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, message, token_used)
            VALUES ($1, $2, $3)
            RETURNING id, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_message.message)
        .bind(&new_message.token_used)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(message) => Ok(message),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateToken)
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Message>, StoreError> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, message, created_at
            FROM messages
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
