// ============================================================================
// Redis-backed used-token registry
// ============================================================================
//
// Key: "{prefix}{sha256(token)}" with a TTL equal to the token's remaining
// lifetime, so Redis forgets entries on its own once they can no longer
// matter. SET NX PX is the atomic reservation.
//
// ============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};

use super::UsedTokenStore;

const RESERVED: &str = "reserved";
const USED: &str = "used";

#[derive(Clone)]
pub struct RedisUsedTokens {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisUsedTokens {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let connection = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        format!("{}{}", self.key_prefix, hex::encode(digest))
    }
}

/// Remaining lifetime in whole milliseconds, rounded up so the key never
/// disappears before the token stops validating.
fn ttl_millis(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = expires_at - now;
    let whole = remaining.num_milliseconds();
    let rounded = if remaining > chrono::Duration::milliseconds(whole) {
        whole + 1
    } else {
        whole
    };
    rounded.max(1)
}

#[async_trait::async_trait]
impl UsedTokenStore for RedisUsedTokens {
    async fn contains(&self, token: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(self.key(token)).await?;
        Ok(exists)
    }

    async fn reserve(&self, token: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let ttl_ms = ttl_millis(expires_at, Utc::now());
        let mut conn = self.connection.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(token))
            .arg(RESERVED)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn commit(&self, token: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: Option<String> = redis::cmd("SET")
            .arg(self.key(token))
            .arg(USED)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, token: &str) -> Result<()> {
        // Only a reservation may be dropped; the check and the DEL must not
        // be split or a concurrent commit could be lost.
        let script = redis::Script::new(
            r"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
            ",
        );

        let mut conn = self.connection.clone();
        let _: i64 = script
            .key(self.key(token))
            .arg(RESERVED)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn prune_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
        // Keys carry their own TTL
        Ok(0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
