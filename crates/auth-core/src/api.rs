//! Boundary to the external auth REST API
//!
//! Only the unauthenticated endpoints live here. Endpoints that need a bearer
//! credential (change-password, admin registration) go through the
//! [`RequestAuthorizer`](crate::authorizer::RequestAuthorizer).

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{AuthError, Result};
use crate::types::{CredentialPair, LoginRequest, RegistrationRequest};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ADMIN_REGISTER_PATH: &str = "/auth/admin/register";
pub const REFRESH_PATH: &str = "/auth/refresh-token";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";

/// Unauthenticated auth endpoints consumed by the session manager
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse>;

    /// `POST /auth/register`; returns the server's confirmation message
    async fn register(&self, request: &RegistrationRequest) -> Result<String>;

    /// `POST /auth/refresh-token?refreshToken=<value>`; the refresh token rotates
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair>;
}

/// Token response of login/refresh. Either field may be missing on a
/// misbehaving server, which login treats as an invalid credential.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Both tokens, if both are present and non-empty
    pub fn into_pair(self) -> Option<CredentialPair> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(CredentialPair::new(access, refresh))
            }
            _ => None,
        }
    }
}

/// Join an API path onto the base URL without losing the base's own path
pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
    let mut joined = base.clone();
    let base_path = base.path().trim_end_matches('/');
    let suffix = path.trim_start_matches('/');
    joined.set_path(&format!("{}/{}", base_path, suffix));
    joined
}

/// Extract a human-readable message from an error response.
///
/// Prefers a JSON `message` field, then the raw body, then the status text.
pub(crate) async fn error_from_response(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    AuthError::Api {
        status: status.as_u16(),
        message,
    }
}

/// [`AuthApi`] over HTTP with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: Url,
}

impl HttpAuthApi {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// Share an existing client (connection pool) with the authorizer
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse> {
        debug!("Logging in {} as {}", request.email, request.role);
        let response = self
            .client
            .post(endpoint(&self.base_url, LOGIN_PATH))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    async fn register(&self, request: &RegistrationRequest) -> Result<String> {
        let response = self
            .client
            .post(endpoint(&self.base_url, REGISTER_PATH))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.text().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair> {
        let response = self
            .client
            .post(endpoint(&self.base_url, REFRESH_PATH))
            .query(&[("refreshToken", refresh_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<TokenResponse>()
            .await?
            .into_pair()
            .ok_or_else(|| AuthError::Decode("refresh response lacks a token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("http://localhost:8080/api").unwrap();
        assert_eq!(
            endpoint(&base, "/auth/login").as_str(),
            "http://localhost:8080/api/auth/login"
        );

        let base = Url::parse("http://localhost:8080/api/").unwrap();
        assert_eq!(
            endpoint(&base, "bookings/customer").as_str(),
            "http://localhost:8080/api/bookings/customer"
        );

        let bare = Url::parse("http://localhost:9000").unwrap();
        assert_eq!(
            endpoint(&bare, "/variants").as_str(),
            "http://localhost:9000/variants"
        );
    }

    #[test]
    fn test_token_response_requires_both_tokens() {
        let full: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"a","refreshToken":"r"}"#).unwrap();
        assert_eq!(full.into_pair(), Some(CredentialPair::new("a", "r")));

        let partial: TokenResponse = serde_json::from_str(r#"{"accessToken":"a"}"#).unwrap();
        assert!(partial.into_pair().is_none());

        let empty: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"","refreshToken":"r"}"#).unwrap();
        assert!(empty.into_pair().is_none());
    }
}
