//! HTTP API for the password safe.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/public-key` - Server public key (base64 SPKI)
//! - `POST /api/register-public-key` - Register the client signing key
//! - `POST /api/secure-data` - Verify and decrypt a signed payload
//! - `POST /api/register` - Create an account
//! - `GET /api/data?accountId=` - Salt and encrypted safe for an account
//! - `POST /api/safe` - Replace the encrypted safe

mod accounts;
mod channel;
mod error;
mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
