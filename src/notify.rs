// ============================================================================
// Operator Notifications
// ============================================================================
//
// After a message is stored the operator gets a ping in a Telegram chat. The
// ping carries no message content. Delivery is best-effort: the pipeline
// spawns it and never waits for, retries, or reports the outcome.
//
// ============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::NotifyConfig;
use crate::utils::SecureString;

#[derive(Debug, Clone)]
pub struct MessageNotification {
    pub message_id: Uuid,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &MessageNotification) -> Result<()>;
}

/// Used when no chat is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait::async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, _notification: &MessageNotification) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Sends a fixed text through the Bot API `sendMessage` method.
#[derive(Clone)]
pub struct TelegramNotifier {
    http_client: reqwest::Client,
    api_base: String,
    bot_token: SecureString,
    chat_id: String,
    text: String,
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: SecureString,
        chat_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token,
            chat_id: chat_id.into(),
            text: text.into(),
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token.as_str())
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: &MessageNotification) -> Result<()> {
        let response = self
            .http_client
            .post(self.send_message_url())
            .json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text: &self.text,
            })
            .send()
            .await
            // reqwest errors embed the URL, which embeds the bot token
            .map_err(|e| anyhow::anyhow!("Telegram request failed: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Telegram API responded with {}", status);
        }

        tracing::debug!(
            message_id = %notification.message_id,
            "Operator notification sent"
        );
        Ok(())
    }
}

/// Telegram when both the bot token and chat id are configured, otherwise
/// a no-op.
pub fn notifier_from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            tracing::info!("Telegram notifications enabled");
            Ok(Arc::new(TelegramNotifier::new(
                config.telegram_api_base.clone(),
                token.clone(),
                chat_id.clone(),
                config.message_text.clone(),
            )?))
        }
        _ => {
            tracing::info!("Telegram notifications disabled");
            Ok(Arc::new(DisabledNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_url() {
        let notifier = TelegramNotifier::new(
            "https://api.telegram.org/",
            SecureString::from("123:abc"),
            "42",
            "ping",
        )
        .unwrap();
        assert_eq!(
            notifier.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_notifications_disabled_without_chat_id() {
        let config = NotifyConfig {
            telegram_bot_token: Some(SecureString::from("123:abc")),
            ..NotifyConfig::default()
        };
        assert!(notifier_from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_disabled_notifier_succeeds() {
        let notification = MessageNotification {
            message_id: Uuid::new_v4(),
        };
        assert!(DisabledNotifier.notify(&notification).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        // Port 9 on loopback: connection refused
        let notifier = TelegramNotifier::new(
            "http://127.0.0.1:9",
            SecureString::from("123:abc"),
            "42",
            "ping",
        )
        .unwrap();
        let notification = MessageNotification {
            message_id: Uuid::new_v4(),
        };
        let err = notifier.notify(&notification).await.unwrap_err();
        assert!(!err.to_string().contains("123:abc"));
    }
}
