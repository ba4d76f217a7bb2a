use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use super::UsedTokenStore;
use crate::clock::Clock;
use crate::metrics;

/// Background task that periodically forgets consumed tokens whose expiry
/// has passed. Such tokens fail the age check anyway, so the entries only
/// cost memory.
pub struct UsedTokenPruneTask {
    used_tokens: Arc<dyn UsedTokenStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl UsedTokenPruneTask {
    pub fn new(
        used_tokens: Arc<dyn UsedTokenStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            used_tokens,
            clock,
            interval,
        }
    }

    /// Runs one pruning pass. Returns the number of entries removed.
    pub async fn prune_once(&self) -> anyhow::Result<u64> {
        let pruned = self.used_tokens.prune_expired(self.clock.now()).await?;
        if pruned > 0 {
            metrics::USED_TOKENS_PRUNED_TOTAL.inc_by(pruned);
        }
        Ok(pruned)
    }

    /// Runs indefinitely; spawn it.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Starting used-token prune task"
        );

        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.prune_once().await {
                Ok(0) => tracing::debug!("No expired used tokens to prune"),
                Ok(pruned) => tracing::info!(pruned = pruned, "Pruned expired used tokens"),
                Err(e) => tracing::error!(error = %e, "Failed to prune used tokens"),
            }
        }
    }
}
