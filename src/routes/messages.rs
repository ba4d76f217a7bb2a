// ============================================================================
// Messages Routes
// ============================================================================
//
// Endpoints:
// - POST   /api/messages     - Submit a message (single-use token)
// - GET    /api/messages     - List recent messages, newest first
// - DELETE /api/messages/:id - Delete a message (fresh token, reusable)
//
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::{AppError, AppResult, ProtocolError};
use crate::routes::extractors::RequestClient;
use crate::store::Message;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageRequest {
    pub encoded_data: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageRequest {
    pub token: String,
}

/// Malformed or mistyped JSON is a format error like any other bad payload.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!(rejection = %rejection, "Rejected request body");
            Err(ProtocolError::InvalidFormat.into())
        }
    }
}

/// POST /api/messages
pub async fn submit_message(
    State(app_context): State<Arc<AppContext>>,
    RequestClient(client): RequestClient,
    body: Result<Json<SubmitMessageRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let request = json_body(body)?;

    app_context
        .pipeline
        .submit(&request.encoded_data, &request.token, &client)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

/// GET /api/messages
pub async fn list_messages(
    State(app_context): State<Arc<AppContext>>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = app_context
        .store
        .list_recent(app_context.config.messages_page_limit)
        .await?;
    Ok(Json(messages))
}

/// DELETE /api/messages/:id
pub async fn delete_message(
    State(app_context): State<Arc<AppContext>>,
    Path(id): Path<String>,
    RequestClient(client): RequestClient,
    body: Result<Json<DeleteMessageRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let request = json_body(body)?;

    app_context
        .pipeline
        .delete(&id, &request.token, &client)
        .await?;

    Ok(Json(json!({ "success": true })))
}
