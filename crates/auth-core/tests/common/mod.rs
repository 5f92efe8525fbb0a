//! Shared fixtures for the session integration tests

#![allow(dead_code)]

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use rental_auth_core::{HttpAuthApi, MemoryTokenStore, RequestAuthorizer, SessionManager};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::MockServer;

/// Mint an HS256 access token; the client never checks the signature
pub fn access_token(email: &str, role: &str, ttl_secs: i64) -> String {
    let exp = Utc::now().timestamp() + ttl_secs;
    encode(
        &Header::default(),
        &json!({ "sub": email, "role": role, "exp": exp }),
        &EncodingKey::from_secret(b"server-signing-key"),
    )
    .expect("failed to mint test token")
}

pub fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({ "accessToken": access, "refreshToken": refresh })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Session manager and authorizer wired to a mock server over `store`
pub fn client(server: &MockServer, store: &MemoryTokenStore) -> (SessionManager, RequestAuthorizer) {
    let base = Url::parse(&server.uri()).expect("mock server uri");
    let api = HttpAuthApi::new(base.clone(), Duration::from_secs(5)).expect("http client");
    let sessions = SessionManager::new(Arc::new(store.clone()), Arc::new(api));
    let authorizer = RequestAuthorizer::new(sessions.clone(), base, Duration::from_secs(5))
        .expect("authorizer");
    (sessions, authorizer)
}

/// Install a test subscriber once so `RUST_LOG` works while debugging
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
