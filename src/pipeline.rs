// ============================================================================
// Submission Pipeline
// ============================================================================
//
// create: decode → validate token → verify checksum → sanitize
//         → reserve token → persist → commit token → notify (spawned)
// delete: validate token (reusable) → delete row → record token
//
// A token is only committed once the write it authorizes has landed. A
// failed write releases the reservation so the client can retry with the
// same token.
//
// ============================================================================

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::integrity::{IntegrityChecker, SubmittedPayload};
use crate::metrics;
use crate::notify::{MessageNotification, Notifier};
use crate::sanitize::sanitize_message;
use crate::store::{MessageStore, NewMessage, StoreError};
use crate::token::{ClientContext, TokenUse, TokenValidator, UsedTokenStore};
use crate::utils::log_safe_id;

pub struct SubmissionPipeline {
    validator: Arc<TokenValidator>,
    integrity: IntegrityChecker,
    used_tokens: Arc<dyn UsedTokenStore>,
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
    max_message_chars: usize,
    log_salt: String,
}

impl SubmissionPipeline {
    pub fn new(
        validator: Arc<TokenValidator>,
        integrity: IntegrityChecker,
        used_tokens: Arc<dyn UsedTokenStore>,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
        max_message_chars: usize,
        log_salt: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            integrity,
            used_tokens,
            store,
            notifier,
            max_message_chars,
            log_salt: log_salt.into(),
        }
    }

    /// Accepts a message. Returns the id of the stored row.
    pub async fn submit(
        &self,
        encoded_data: &str,
        token: &str,
        client: &ClientContext,
    ) -> Result<Uuid, ProtocolError> {
        let result = self.try_submit(encoded_data, token, client).await;
        if let Err(e) = &result {
            self.record_rejection("submit", token, e);
        }
        result
    }

    async fn try_submit(
        &self,
        encoded_data: &str,
        token: &str,
        client: &ClientContext,
    ) -> Result<Uuid, ProtocolError> {
        let payload = decode_payload(encoded_data)?;
        let claims = self.validator.validate(token, client).await?;

        self.integrity
            .verify(&payload, token)
            .map_err(|_| ProtocolError::TamperDetected)?;

        let text = sanitize_message(&payload.message, self.max_message_chars)
            .ok_or(ProtocolError::InvalidFormat)?;

        // Validation only read the registry; two requests carrying the same
        // token can both get here. The reservation picks one.
        let reserved = self
            .used_tokens
            .reserve(token, self.validator.expires_at(&claims))
            .await
            .map_err(ProtocolError::Storage)?;
        if !reserved {
            return Err(ProtocolError::AlreadyUsed);
        }

        let created = self
            .store
            .create(NewMessage {
                message: text,
                token_used: token.to_string(),
            })
            .await;

        let message = match created {
            Ok(message) => message,
            Err(StoreError::DuplicateToken) => {
                // A row already carries this token, so it is spent regardless
                self.commit(token).await;
                return Err(ProtocolError::AlreadyUsed);
            }
            Err(StoreError::Backend(e)) => {
                if let Err(release_err) = self.used_tokens.release(token).await {
                    tracing::error!(
                        error = %release_err,
                        token = %log_safe_id(token, &self.log_salt),
                        "Failed to release token reservation"
                    );
                }
                return Err(ProtocolError::Storage(e));
            }
        };

        self.commit(token).await;
        metrics::MESSAGES_ACCEPTED_TOTAL.inc();
        tracing::info!(
            message_id = %message.id,
            token = %log_safe_id(token, &self.log_salt),
            "Message accepted"
        );

        self.spawn_notification(message.id);
        Ok(message.id)
    }

    /// Deletes a message. The token must be valid and bound to this client
    /// but need not be unspent.
    pub async fn delete(
        &self,
        message_id: &str,
        token: &str,
        client: &ClientContext,
    ) -> Result<(), ProtocolError> {
        let result = self.try_delete(message_id, token, client).await;
        if let Err(e) = &result {
            self.record_rejection("delete", token, e);
        }
        result
    }

    async fn try_delete(
        &self,
        message_id: &str,
        token: &str,
        client: &ClientContext,
    ) -> Result<(), ProtocolError> {
        let claims = self
            .validator
            .validate_for(token, client, TokenUse::Reusable)
            .await?;

        let id = Uuid::parse_str(message_id).map_err(|_| ProtocolError::NotFound)?;
        if !self.store.delete(id).await? {
            return Err(ProtocolError::NotFound);
        }

        metrics::MESSAGES_DELETED_TOTAL.inc();
        tracing::info!(
            message_id = %id,
            token = %log_safe_id(token, &self.log_salt),
            "Message deleted"
        );

        // Keeps a deletion token from being spent on a submission later.
        // Already present is fine.
        let expires_at = self.validator.expires_at(&claims);
        if let Err(e) = self.used_tokens.mark_used(token, expires_at).await {
            tracing::warn!(
                error = %e,
                token = %log_safe_id(token, &self.log_salt),
                "Failed to record deletion token as used"
            );
        }

        Ok(())
    }

    async fn commit(&self, token: &str) {
        // The row is stored; the reservation still blocks reuse even if
        // this fails.
        if let Err(e) = self.used_tokens.commit(token).await {
            tracing::error!(
                error = %e,
                token = %log_safe_id(token, &self.log_salt),
                "Failed to commit used token"
            );
        }
    }

    fn spawn_notification(&self, message_id: Uuid) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let notification = MessageNotification { message_id };
            if let Err(e) = notifier.notify(&notification).await {
                metrics::NOTIFICATION_FAILURES_TOTAL.inc();
                tracing::warn!(
                    error = %e,
                    message_id = %message_id,
                    "Failed to send operator notification"
                );
            }
        });
    }

    fn record_rejection(&self, operation: &'static str, token: &str, error: &ProtocolError) {
        metrics::REJECTIONS_TOTAL
            .with_label_values(&[error.reason()])
            .inc();

        match error {
            ProtocolError::Storage(e) => tracing::error!(
                operation = operation,
                error = %e,
                token = %log_safe_id(token, &self.log_salt),
                "Storage failure"
            ),
            _ => tracing::warn!(
                operation = operation,
                reason = error.reason(),
                token = %log_safe_id(token, &self.log_salt),
                "Request rejected"
            ),
        }
    }
}

/// Decodes `base64(JSON {message, checksum})`.
pub fn decode_payload(encoded_data: &str) -> Result<SubmittedPayload, ProtocolError> {
    let bytes = BASE64
        .decode(encoded_data.trim())
        .map_err(|_| ProtocolError::InvalidFormat)?;
    serde_json::from_slice(&bytes).map_err(|_| ProtocolError::InvalidFormat)
}
