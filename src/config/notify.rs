// ============================================================================
// Notification Configuration
// ============================================================================

use crate::utils::SecureString;

const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_NOTIFICATION_TEXT: &str = "New anonymous message received";

/// Operator chat notification. Disabled unless both the bot token and the
/// chat id are present.
#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub telegram_bot_token: Option<SecureString>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: String,
    pub message_text: String,
}

impl NotifyConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(SecureString::new),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")
                .ok()
                .filter(|c| !c.trim().is_empty()),
            telegram_api_base: std::env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE.to_string()),
            message_text: std::env::var("TELEGRAM_MESSAGE")
                .unwrap_or_else(|_| DEFAULT_NOTIFICATION_TEXT.to_string()),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            message_text: DEFAULT_NOTIFICATION_TEXT.to_string(),
        }
    }
}
