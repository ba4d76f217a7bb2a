// ============================================================================
// Token Routes
// ============================================================================
//
// Endpoints:
// - GET /api/token - Issue a submission token bound to the caller
//
// ============================================================================

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::metrics;
use crate::routes::extractors::RequestClient;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// GET /api/token
pub async fn issue_token(
    State(app_context): State<Arc<AppContext>>,
    RequestClient(client): RequestClient,
) -> AppResult<Json<TokenResponse>> {
    let issued = app_context.issuer.issue(&client)?;
    metrics::TOKENS_ISSUED_TOTAL.inc();

    if app_context.config.logging.enable_client_identifiers {
        tracing::debug!(
            client = %crate::utils::log_safe_id(
                &client.fingerprint(),
                &app_context.config.logging.hash_salt
            ),
            "Token issued"
        );
    }

    Ok(Json(TokenResponse {
        token: issued.token,
    }))
}
