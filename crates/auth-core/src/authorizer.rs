//! Credential attachment and transparent renewal for outbound API calls
//!
//! Every call made through [`RequestAuthorizer::send`] carries the access
//! token installed in the [`SessionManager`] at the moment it is sent. A
//! `401 Unauthorized` answer is recovered from once: the call joins (or
//! starts) the single in-flight renewal and is reissued with the new token.
//! Whether a call has already been retried is tracked by the call's own
//! loop, never by a flag stored on a shared request object.
//!
//! Expiry is detected from the server's answer rather than by checking the
//! token's `exp` before each call, which keeps the client immune to clock
//! skew between it and the server.

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::api::{endpoint, error_from_response, ADMIN_REGISTER_PATH, CHANGE_PASSWORD_PATH};
use crate::error::{AuthError, RenewalError, Result};
use crate::renewal::RenewalOutcome;
use crate::session::{RenewalTrigger, SessionManager};
use crate::types::{AdminRegistrationRequest, ChangePasswordRequest};

/// Description of an API call, replayable for the single retry
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| AuthError::Config(format!("Unserializable request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Successful (2xx) response with its body read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| AuthError::Api {
            status: self.status.as_u16(),
            message: format!("unexpected response body: {}", e),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

/// Wraps outbound API calls with the session's credential
#[derive(Clone)]
pub struct RequestAuthorizer {
    client: Client,
    base_url: Url,
    session: SessionManager,
}

impl RequestAuthorizer {
    pub fn new(session: SessionManager, base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url, session))
    }

    pub fn with_client(client: Client, base_url: Url, session: SessionManager) -> Self {
        Self {
            client,
            base_url,
            session,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send `request`, renewing and retrying once on `401`.
    ///
    /// Non-2xx answers other than `401` come back as [`AuthError::Api`]
    /// unchanged and are never retried. A `401` that cannot be recovered
    /// comes back as [`AuthError::AuthorizationFailure`].
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut attempt = Attempt::First;
        let mut token = self.session.access_token();

        loop {
            let response = self.dispatch(request, token.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Self::finish(response).await;
            }

            if attempt == Attempt::Retried {
                warn!("{} {} rejected again after renewal", request.method, request.path);
                return Err(self.rejected(request));
            }
            if !self.session.has_refresh_token() {
                debug!("{} {} unauthorized and no refresh token held", request.method, request.path);
                return Err(self.rejected(request));
            }

            attempt = Attempt::Retried;
            debug!("{} {} unauthorized, renewing credentials", request.method, request.path);
            let trigger = RenewalTrigger::Rejected(token.as_deref());
            token = match self.session.renew_after(trigger).await {
                Ok(fresh) => Some(fresh),
                Err(RenewalError::Superseded) => {
                    // A login replaced the session mid-renewal; its token is as good.
                    match self.session.access_token() {
                        Some(current) if token.as_deref() != Some(current.as_str()) => Some(current),
                        _ => return Err(self.rejected(request)),
                    }
                }
                Err(e) => {
                    debug!("Renewal for {} {} failed: {}", request.method, request.path, e);
                    return Err(self.rejected(request));
                }
            };
        }
    }

    /// [`send`](Self::send) and deserialize the JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        self.send(request).await?.json()
    }

    /// Renew outside of any call, sharing any renewal already in flight
    pub async fn renew(&self) -> RenewalOutcome {
        self.session.renew().await
    }

    /// `POST /auth/change-password`.
    ///
    /// Returns the server's confirmation message. A rejected change leaves
    /// the session exactly as it was.
    pub async fn change_credential_secret(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<String> {
        let request = ApiRequest::post(CHANGE_PASSWORD_PATH).json(&ChangePasswordRequest {
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
        })?;
        Ok(self.send(&request).await?.text())
    }

    /// `POST /auth/admin/register`, made by an authenticated admin
    pub async fn register_admin(&self, request: &AdminRegistrationRequest) -> Result<String> {
        let request = ApiRequest::post(ADMIN_REGISTER_PATH).json(request)?;
        Ok(self.send(&request).await?.text())
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), endpoint(&self.base_url, &request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder.send().await?)
    }

    async fn finish(response: Response) -> Result<ApiResponse> {
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }

    fn rejected(&self, request: &ApiRequest) -> AuthError {
        AuthError::AuthorizationFailure {
            method: request.method.to_string(),
            path: request.path.clone(),
        }
    }
}
