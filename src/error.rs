use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::token::TokenError;

pub type AppResult<T> = Result<T, AppError>;

/// Outcome of a refused submission or deletion.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("payload could not be decoded")]
    InvalidFormat,

    #[error("token signature or structure is invalid")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("token already used")]
    AlreadyUsed,

    #[error("token was issued to a different client")]
    ContextMismatch,

    #[error("checksum does not match payload")]
    TamperDetected,

    #[error("message not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl ProtocolError {
    /// Label used for the rejection metric and in logs
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::InvalidFormat => "invalid_format",
            ProtocolError::InvalidToken => "invalid_token",
            ProtocolError::Expired => "expired",
            ProtocolError::AlreadyUsed => "already_used",
            ProtocolError::ContextMismatch => "context_mismatch",
            ProtocolError::TamperDetected => "tamper_detected",
            ProtocolError::NotFound => "not_found",
            ProtocolError::Storage(_) => "storage_error",
        }
    }
}

impl From<TokenError> for ProtocolError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ProtocolError::InvalidToken,
            TokenError::Expired => ProtocolError::Expired,
            TokenError::AlreadyUsed => ProtocolError::AlreadyUsed,
            TokenError::ContextMismatch => ProtocolError::ContextMismatch,
            TokenError::Registry(e) => ProtocolError::Storage(e),
        }
    }
}

impl From<StoreError> for ProtocolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateToken => ProtocolError::AlreadyUsed,
            StoreError::Backend(e) => ProtocolError::Storage(e),
        }
    }
}

/// Error type returned by HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Protocol(err.into())
    }
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Protocol(e) => match e {
                ProtocolError::InvalidFormat | ProtocolError::TamperDetected => {
                    StatusCode::BAD_REQUEST
                }
                ProtocolError::InvalidToken
                | ProtocolError::Expired
                | ProtocolError::AlreadyUsed
                | ProtocolError::ContextMismatch => StatusCode::UNAUTHORIZED,
                ProtocolError::NotFound => StatusCode::NOT_FOUND,
                ProtocolError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short reason shown to the client (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Protocol(e) => match e {
                ProtocolError::InvalidFormat => "Invalid data format",
                ProtocolError::InvalidToken => "Invalid or expired token",
                ProtocolError::Expired => "Token expired",
                ProtocolError::AlreadyUsed => "Token already used",
                ProtocolError::ContextMismatch => "Invalid request source",
                ProtocolError::TamperDetected => "Data tampering detected",
                ProtocolError::NotFound => "Message not found",
                ProtocolError::Storage(_) => "Internal server error",
            }
            .to_string(),
            AppError::Unknown(_) => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Protocol(e) => match e {
                ProtocolError::InvalidFormat => "INVALID_FORMAT",
                ProtocolError::InvalidToken => "INVALID_TOKEN",
                ProtocolError::Expired => "TOKEN_EXPIRED",
                ProtocolError::AlreadyUsed => "TOKEN_ALREADY_USED",
                ProtocolError::ContextMismatch => "CONTEXT_MISMATCH",
                ProtocolError::TamperDetected => "TAMPER_DETECTED",
                ProtocolError::NotFound => "NOT_FOUND",
                ProtocolError::Storage(_) => "STORAGE_ERROR",
            },
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context. Refused tokens
    /// and payloads are already logged by the pipeline with the hashed token.
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(error = %self, error_code = %code, "Client error occurred");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let body = json!({
            "error": self.user_message(),
            "error_code": self.error_code(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ProtocolError::InvalidFormat, StatusCode::BAD_REQUEST),
            (ProtocolError::TamperDetected, StatusCode::BAD_REQUEST),
            (ProtocolError::InvalidToken, StatusCode::UNAUTHORIZED),
            (ProtocolError::Expired, StatusCode::UNAUTHORIZED),
            (ProtocolError::AlreadyUsed, StatusCode::UNAUTHORIZED),
            (ProtocolError::ContextMismatch, StatusCode::UNAUTHORIZED),
            (ProtocolError::NotFound, StatusCode::NOT_FOUND),
            (
                ProtocolError::Storage(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_storage_error_hides_detail() {
        let err = AppError::from(ProtocolError::Storage(anyhow::anyhow!(
            "connection refused to db.internal:5432"
        )));
        assert_eq!(err.user_message(), "Internal server error");
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }

    /// Counts events at WARN or above
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() <= tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_client_errors_are_not_logged_at_warn() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));

        tracing::subscriber::with_default(subscriber, || {
            for err in [
                ProtocolError::AlreadyUsed,
                ProtocolError::ContextMismatch,
                ProtocolError::TamperDetected,
            ] {
                let _ = AppError::from(err).into_response();
            }
        });
        assert_eq!(warnings.load(Ordering::SeqCst), 0);

        tracing::subscriber::with_default(
            tracing_subscriber::registry().with(WarnCounter(warnings.clone())),
            || {
                let _ = AppError::from(ProtocolError::Storage(anyhow::anyhow!("db down")))
                    .into_response();
            },
        );
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_token_maps_to_already_used() {
        let err = ProtocolError::from(StoreError::DuplicateToken);
        assert!(matches!(err, ProtocolError::AlreadyUsed));
    }

    #[test]
    fn test_token_errors_map_one_to_one() {
        assert!(matches!(
            ProtocolError::from(TokenError::Invalid),
            ProtocolError::InvalidToken
        ));
        assert!(matches!(
            ProtocolError::from(TokenError::Registry(anyhow::anyhow!("redis down"))),
            ProtocolError::Storage(_)
        ));
    }
}
