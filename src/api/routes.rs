//! HTTP router, shared state and server startup.

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::crypto::{IdentityKeyPair, ServerIdentity};
use crate::service::SafeService;
use crate::store::create_safe_store;

use super::accounts;
use super::channel;
use super::types::HealthResponse;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Account and safe operations
    pub service: SafeService,
    /// Server keypair plus the registered client key
    pub identity: Arc<ServerIdentity>,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_allow_any {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/api/health", get(health))
        .nest("/api", channel::routes().merge(accounts::routes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let keypair = IdentityKeyPair::load_or_generate(&config.key_dir).await?;
    let identity = Arc::new(ServerIdentity::new(keypair));

    let store = create_safe_store(config.store_type, config.data_dir.clone()).await?;
    if !store.is_persistent() {
        tracing::warn!("Using in-memory account store; accounts are lost on restart");
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        service: SafeService::new(store),
        identity,
    });
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_persistent: state.service.store().is_persistent(),
        counterpart_registered: state.identity.counterpart().is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::crypto::identity::decode_public_key;
    use crate::crypto::seal_and_sign;
    use crate::crypto::test_keys::{client_keys, other_client_keys, server_keys};
    use crate::safe::{CredentialRecord, Safe, SafeSession};
    use crate::store::InMemorySafeStore;

    fn test_app() -> Router {
        let dir = std::env::temp_dir();
        let state = Arc::new(AppState {
            config: Config::new(dir),
            service: SafeService::new(Arc::new(InMemorySafeStore::new())),
            identity: Arc::new(ServerIdentity::new(server_keys().clone())),
        });
        router(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(app, request).await
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    fn parse(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    async fn register_client(app: &Router) {
        let public_key = client_keys().export_public().unwrap();
        let (status, body) =
            post_json(app, "/api/register-public-key", json!({ "publicKey": public_key })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            parse(&body)["fingerprint"],
            client_keys().fingerprint().unwrap()
        );
    }

    #[tokio::test]
    async fn health_reports_state() {
        let app = test_app();
        let (status, body) = get_json(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let body = parse(&body);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storePersistent"], false);
        assert_eq!(body["counterpartRegistered"], false);
    }

    #[tokio::test]
    async fn public_key_is_bare_base64() {
        let app = test_app();
        let (status, body) = get_json(&app, "/api/public-key").await;
        assert_eq!(status, StatusCode::OK);
        let exported = parse(&body)["publicKey"].as_str().unwrap().to_string();
        assert!(!exported.contains("BEGIN"));
        assert_eq!(
            &decode_public_key(&exported).unwrap(),
            server_keys().public_key()
        );
    }

    #[tokio::test]
    async fn secure_data_requires_registered_client() {
        let app = test_app();
        let payload = seal_and_sign(server_keys().public_key(), client_keys(), "hello").unwrap();
        let (status, _) = post_json(
            &app,
            "/api/secure-data",
            serde_json::to_value(payload.encode()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn secure_data_roundtrip() {
        let app = test_app();
        register_client(&app).await;

        let payload = seal_and_sign(server_keys().public_key(), client_keys(), "hello").unwrap();
        let (status, body) = post_json(
            &app,
            "/api/secure-data",
            serde_json::to_value(payload.encode()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body)["decryptedData"], "hello");
    }

    #[tokio::test]
    async fn secure_data_from_wrong_signer_is_generic_failure() {
        let app = test_app();
        register_client(&app).await;

        let payload =
            seal_and_sign(server_keys().public_key(), other_client_keys(), "hello").unwrap();
        let (status, body) = post_json(
            &app,
            "/api/secure-data",
            serde_json::to_value(payload.encode()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"could not open secure data");
    }

    #[tokio::test]
    async fn secure_data_missing_fields_is_bad_request() {
        let app = test_app();
        register_client(&app).await;
        let (status, _) =
            post_json(&app, "/api/secure-data", json!({ "encryptedData": "AAAA" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mistyped_json_fields_are_bad_request() {
        let app = test_app();
        let cases = [
            ("/api/register-public-key", json!({ "publicKey": 5 })),
            ("/api/secure-data", json!({ "encryptedData": [], "signature": "AAAA" })),
            ("/api/register", json!({ "accountId": 7 })),
            ("/api/safe", json!({ "accountId": "a", "expectedVersion": "one" })),
        ];
        for (uri, body) in cases {
            let (status, _) = post_json(&app, uri, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/api/register")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_client_key_is_rejected() {
        let app = test_app();
        let (status, _) = post_json(
            &app,
            "/api/register-public-key",
            json!({ "publicKey": "not a key" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = get_json(&app, "/api/health").await;
        assert_eq!(parse(&body)["counterpartRegistered"], false);
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let app = test_app();
        let (session, request) = SafeSession::register("alice@example.com", "pw1").unwrap();

        let (status, _) =
            post_json(&app, "/api/register", serde_json::to_value(&request).unwrap()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            post_json(&app, "/api/register", serde_json::to_value(&request).unwrap()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = get_json(&app, "/api/data?accountId=alice@example.com").await;
        assert_eq!(status, StatusCode::OK);
        let data = parse(&body);
        assert_eq!(data["saltBase64"], request.salt_base64);
        assert_eq!(data["version"], 0);

        let mut safe = Safe::new();
        safe.insert(CredentialRecord::new("example.com", "alice", "s3cr3t", ""));
        let envelope = session.seal(&safe).unwrap().encode();
        let update = json!({
            "accountId": "alice@example.com",
            "ciphertext": envelope.ciphertext,
            "nonce": envelope.nonce,
            "expectedVersion": 0,
        });
        let (status, body) = post_json(&app, "/api/safe", update.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body)["version"], 1);

        let (status, _) = post_json(&app, "/api/safe", update).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = get_json(&app, "/api/data?accountId=alice@example.com").await;
        let data: crate::service::SafeSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(data.version, 1);
        assert_eq!(session.open_encoded(&data.safe_envelope).unwrap(), safe);
    }

    #[tokio::test]
    async fn unknown_account_and_missing_query() {
        let app = test_app();
        let (status, _) = get_json(&app, "/api/data?accountId=nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(&app, "/api/data").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
