//! Account registration and encrypted safe storage endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};

use crate::service::{NewAccount, SafeSnapshot, SafeUpdate};

use super::error::{json_body, service_error, ApiError};
use super::routes::AppState;
use super::types::{DataQuery, MessageResponse, SafeWriteResponse};

/// Create the account API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/data", get(get_data))
        .route("/safe", post(update_safe))
}

/// POST /api/register
async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewAccount>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let req = json_body(body)?;
    state
        .service
        .create_account(req)
        .await
        .map_err(service_error)?;
    Ok(Json(MessageResponse {
        message: "Account registered".to_string(),
    }))
}

/// GET /api/data?accountId=...
/// Salt and the current envelope; the client derives the key and decrypts.
async fn get_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DataQuery>,
) -> Result<Json<SafeSnapshot>, ApiError> {
    state
        .service
        .read_safe(&query.account_id)
        .await
        .map(Json)
        .map_err(service_error)
}

/// POST /api/safe
async fn update_safe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SafeUpdate>, JsonRejection>,
) -> Result<Json<SafeWriteResponse>, ApiError> {
    let req = json_body(body)?;
    let version = state
        .service
        .write_safe(req)
        .await
        .map_err(service_error)?;
    Ok(Json(SafeWriteResponse {
        message: "Safe stored".to_string(),
        version,
    }))
}
