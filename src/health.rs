use anyhow::{Context, Result};

use crate::store::MessageStore;
use crate::token::UsedTokenStore;

pub async fn health_check(
    store: &dyn MessageStore,
    used_tokens: &dyn UsedTokenStore,
) -> Result<()> {
    // Check message store
    store.ping().await.context("message store unreachable")?;

    // Check used-token registry
    used_tokens
        .ping()
        .await
        .context("used-token registry unreachable")?;

    Ok(())
}
