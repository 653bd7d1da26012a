//! API request and response types.
//!
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether accounts survive a restart
    pub store_persistent: bool,

    /// Whether a client public key has been registered
    pub counterpart_registered: bool,
}

/// `GET /api/public-key`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// Base64 SPKI DER, no PEM armor.
    pub public_key: String,
}

/// `POST /api/register-public-key`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPublicKeyRequest {
    /// Base64 SPKI DER or a PEM block.
    #[serde(default)]
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPublicKeyResponse {
    pub message: String,
    pub fingerprint: String,
}

/// `POST /api/secure-data`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureDataResponse {
    pub message: String,
    pub decrypted_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `POST /api/safe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeWriteResponse {
    pub message: String,
    pub version: u64,
}

/// `GET /api/data?accountId=...`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    #[serde(default)]
    pub account_id: String,
}
