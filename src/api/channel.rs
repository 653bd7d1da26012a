//! Endpoints for the server identity and the signed secure-data channel.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};

use crate::crypto::{open_and_verify, EncodedPayload, SignedPayload};

use super::error::{crypto_error, internal_error, json_body, ApiError};
use super::routes::AppState;
use super::types::{
    PublicKeyResponse, RegisterPublicKeyRequest, RegisterPublicKeyResponse, SecureDataResponse,
};

/// Create the channel API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/public-key", get(get_public_key))
        .route("/register-public-key", post(register_public_key))
        .route("/secure-data", post(secure_data))
}

/// GET /api/public-key
async fn get_public_key(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let public_key = state
        .identity
        .export_public()
        .map_err(|e| internal_error("Failed to export public key", e))?;
    Ok(Json(PublicKeyResponse { public_key }))
}

/// POST /api/register-public-key
/// Replace the client key that secure payloads must be signed with.
async fn register_public_key(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterPublicKeyRequest>, JsonRejection>,
) -> Result<Json<RegisterPublicKeyResponse>, ApiError> {
    let req = json_body(body)?;
    let fingerprint = state
        .identity
        .register_counterpart(&req.public_key)
        .map_err(crypto_error)?;
    Ok(Json(RegisterPublicKeyResponse {
        message: "Client public key registered".to_string(),
        fingerprint,
    }))
}

/// POST /api/secure-data
/// Verify the signature, then decrypt.
async fn secure_data(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EncodedPayload>, JsonRejection>,
) -> Result<Json<SecureDataResponse>, ApiError> {
    let req = json_body(body)?;
    let payload = SignedPayload::decode(&req).map_err(crypto_error)?;

    let identity = Arc::clone(&state.identity);
    let decrypted_data = tokio::task::spawn_blocking(move || open_and_verify(&*identity, &payload))
        .await
        .map_err(|e| internal_error("Secure payload task failed", e))?
        .map_err(crypto_error)?;

    Ok(Json(SecureDataResponse {
        message: "Data verified and decrypted".to_string(),
        decrypted_data,
    }))
}
