//! Authoritative in-memory session state
//!
//! [`SessionManager`] owns the login, logout and renewal transitions:
//!
//! ```text
//! Uninitialized -> Initializing -> { Authenticated(role), Anonymous }
//! Authenticated -> Anonymous       (logout, failed renewal)
//! Anonymous     -> Authenticated   (login)
//! Authenticated -> Authenticated   (renewal; role re-read from the new token)
//! ```
//!
//! # Ordering
//!
//! Every transition is applied under one write lock, so readers never see a
//! half-updated session. Each login and logout bumps an epoch counter; a
//! renewal remembers the epoch it started under and discards its result if
//! the epoch moved. Writes to the [`TokenStore`] are serialized by a
//! separate async lock, which keeps the persisted pair in step with the
//! in-memory one even when a logout lands in the middle of a renewal.

use chrono::Utc;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::claims::{Claims, ClaimsDecoder};
use crate::error::{AuthError, RenewalError, Result};
use crate::renewal::{RenewalCoordinator, RenewalOutcome, RenewalStart};
use crate::token_store::TokenStore;
use crate::types::{CredentialPair, LoginRequest, RegistrationRequest, Role};

/// Lifecycle phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Authenticated(Role),
    Anonymous,
}

/// What asked for a renewal
#[derive(Debug, Clone, Copy)]
pub(crate) enum RenewalTrigger<'a> {
    /// Explicit request, or the startup check of an expired token
    Requested,
    /// A call sent with this token, or with none, was answered `401`
    Rejected(Option<&'a str>),
}

/// Logged-in identity, always derived from the currently held access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub email: String,
    pub role: Role,
}

/// Snapshot of the session as seen by UI code and the route guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user: Option<SessionUser>,
    /// True until the first determination after startup, never again
    pub is_initializing: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }
}

struct SessionState {
    phase: SessionPhase,
    user: Option<SessionUser>,
    /// Credential installed for outbound calls
    credentials: Option<CredentialPair>,
    epoch: u64,
}

impl SessionState {
    fn snapshot(&self) -> Session {
        Session {
            user: self.user.clone(),
            is_initializing: matches!(
                self.phase,
                SessionPhase::Uninitialized | SessionPhase::Initializing
            ),
        }
    }
}

pub(crate) struct SessionInner {
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    decoder: ClaimsDecoder,
    state: RwLock<SessionState>,
    persist_lock: Mutex<()>,
    renewals: RenewalCoordinator,
    watch_tx: watch::Sender<Session>,
}

/// Owner of the session lifecycle.
///
/// Cheap to clone; clones share the same session. Create one at the
/// application root and hand clones to the
/// [`RequestAuthorizer`](crate::authorizer::RequestAuthorizer) and whatever
/// consults the [`RouteGuard`](crate::guard::RouteGuard).
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TokenStore>, api: Arc<dyn AuthApi>) -> Self {
        let state = SessionState {
            phase: SessionPhase::Uninitialized,
            user: None,
            credentials: None,
            epoch: 0,
        };
        let (watch_tx, _) = watch::channel(state.snapshot());

        Self {
            inner: Arc::new(SessionInner {
                store,
                api,
                decoder: ClaimsDecoder::new(),
                state: RwLock::new(state),
                persist_lock: Mutex::new(()),
                renewals: RenewalCoordinator::new(),
                watch_tx,
            }),
        }
    }

    pub fn session(&self) -> Session {
        self.inner.state.read().snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.read().phase
    }

    /// Receiver that observes every session transition
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.watch_tx.subscribe()
    }

    /// Access token to attach to the next outbound call
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .credentials
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner.state.read().credentials.is_some()
    }

    pub fn renewal_in_flight(&self) -> bool {
        self.inner.renewals.in_flight()
    }

    /// Number of renewal round trips launched by this manager
    pub fn renewals_started(&self) -> u64 {
        self.inner.renewals.launched()
    }

    /// Bootstrap the session from the token store.
    ///
    /// Runs once. Absent credentials settle to `Anonymous`. A readable,
    /// unexpired access token settles to `Authenticated` without any network
    /// call. An expired one triggers exactly one renewal and the session
    /// settles on its outcome. An unreadable one is cleared and settles to
    /// `Anonymous`. Later calls return the current session unchanged.
    pub async fn initialize(&self) -> Result<Session> {
        let epoch = {
            let mut state = self.inner.state.write();
            if state.phase != SessionPhase::Uninitialized {
                debug!("Session already initialized ({:?})", state.phase);
                return Ok(state.snapshot());
            }
            state.phase = SessionPhase::Initializing;
            state.epoch
        };
        self.inner.publish();

        let stored = match self.inner.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read stored credentials, starting anonymous: {}", e);
                None
            }
        };

        match stored {
            None => debug!("No stored credentials"),
            Some(pair) => match self.inner.decoder.decode(&pair.access_token) {
                Err(e) => {
                    warn!("Stored access token is unreadable, discarding it: {}", e);
                    self.inner.discard_stored(epoch).await;
                }
                Ok(claims) if !ClaimsDecoder::is_expired(&claims, Utc::now()) => {
                    info!("Restored session for {} ({})", claims.subject, claims.role);
                    self.inner.apply_authenticated(epoch, claims, pair);
                }
                Ok(claims) => {
                    info!("Stored access token for {} expired, renewing", claims.subject);
                    if self.inner.install_for_renewal(epoch, pair) {
                        if let Err(e) = self.renew().await {
                            warn!("Startup renewal failed: {}", e);
                        }
                    }
                }
            },
        }

        self.inner.settle_anonymous_if_pending();
        Ok(self.session())
    }

    /// Install a freshly issued credential pair.
    ///
    /// Both tokens must be non-empty; otherwise nothing is persisted and the
    /// session is untouched. The role is read from `access_token`.
    pub async fn login(&self, access_token: &str, refresh_token: &str) -> Result<Session> {
        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidCredential(
                "both an access token and a refresh token are required".to_string(),
            ));
        }

        let claims = self.inner.decoder.decode(access_token)?;
        let pair = CredentialPair::new(access_token, refresh_token);
        let started_epoch = self.inner.state.read().epoch;

        let _persist = self.inner.persist_lock.lock().await;
        self.inner.store.save(&pair).await?;

        {
            let mut state = self.inner.state.write();
            if state.epoch != started_epoch {
                // A logout arrived while the pair was being written; it is
                // waiting on the persist lock and will clear the store.
                return Err(AuthError::Superseded);
            }
            state.epoch += 1;
            info!("Logged in {} ({})", claims.subject, claims.role);
            state.phase = SessionPhase::Authenticated(claims.role);
            state.user = Some(SessionUser {
                email: claims.subject,
                role: claims.role,
            });
            state.credentials = Some(pair);
        }
        self.inner.renewals.cancel();
        self.inner.publish();

        Ok(self.session())
    }

    /// `POST /auth/login`, then [`login`](Self::login) with the returned pair
    pub async fn login_with_password(&self, request: &LoginRequest) -> Result<Session> {
        let response = self.inner.api.login(request).await?;
        let pair = response.into_pair().ok_or_else(|| {
            AuthError::InvalidCredential("login response did not contain both tokens".to_string())
        })?;
        self.login(&pair.access_token, &pair.refresh_token).await
    }

    /// Customer self-registration; does not touch the session
    pub async fn register(&self, request: &RegistrationRequest) -> Result<String> {
        self.inner.api.register(request).await
    }

    /// Drop the session and its persisted credentials.
    ///
    /// Takes effect immediately in memory: any renewal still in flight will
    /// have its result discarded. Safe to call when already anonymous.
    pub async fn logout(&self) -> Result<()> {
        self.inner.logout(None).await.map(|_| ())
    }

    /// Exchange the refresh token for a new pair, or join the exchange
    /// already in flight.
    ///
    /// On success the new pair is persisted and installed and the role is
    /// re-read from the new access token. On failure the session is logged
    /// out; this is the only path that signs a user out without being asked.
    pub async fn renew(&self) -> RenewalOutcome {
        self.renew_after(RenewalTrigger::Requested).await
    }

    /// Renewal on behalf of `trigger`. A call rejected while carrying a
    /// token that is no longer current (or no token at all, when a login has
    /// since installed one) gets the current token without a new round trip.
    pub(crate) async fn renew_after(&self, trigger: RenewalTrigger<'_>) -> RenewalOutcome {
        let inner = &self.inner;
        let ticket = inner.renewals.join_or_start(|id| {
            let state = inner.state.read();
            let Some(credentials) = state.credentials.as_ref() else {
                return RenewalStart::Immediate(Err(RenewalError::NoRefreshToken));
            };
            if let RenewalTrigger::Rejected(sent) = trigger {
                if sent != Some(credentials.access_token.as_str()) {
                    debug!("Rejected call did not carry the current token, reusing it");
                    return RenewalStart::Immediate(Ok(credentials.access_token.clone()));
                }
            }

            let refresh_token = credentials.refresh_token.clone();
            let epoch = state.epoch;
            let inner = Arc::clone(inner);
            RenewalStart::Launch(
                async move {
                    let outcome = inner.complete_renewal(epoch, &refresh_token).await;
                    inner.renewals.finish(id);
                    outcome
                }
                .boxed(),
            )
        });

        ticket.outcome().await
    }
}

impl SessionInner {
    fn publish(&self) {
        let snapshot = self.state.read().snapshot();
        self.watch_tx.send_replace(snapshot);
    }

    fn current_epoch(&self) -> u64 {
        self.state.read().epoch
    }

    fn apply_authenticated(&self, epoch: u64, claims: Claims, pair: CredentialPair) -> bool {
        {
            let mut state = self.state.write();
            if state.epoch != epoch {
                return false;
            }
            if let Some(previous) = state.user.as_ref().map(|u| u.role) {
                if previous != claims.role {
                    info!("Role for {} changed from {} to {}", claims.subject, previous, claims.role);
                }
            }
            state.phase = SessionPhase::Authenticated(claims.role);
            state.user = Some(SessionUser {
                email: claims.subject,
                role: claims.role,
            });
            state.credentials = Some(pair);
        }
        self.publish();
        true
    }

    /// Hold the stored pair so the startup renewal can read its refresh token
    fn install_for_renewal(&self, epoch: u64, pair: CredentialPair) -> bool {
        let mut state = self.state.write();
        if state.epoch != epoch {
            return false;
        }
        state.credentials = Some(pair);
        true
    }

    fn settle_anonymous_if_pending(&self) {
        let settled = {
            let mut state = self.state.write();
            if matches!(
                state.phase,
                SessionPhase::Uninitialized | SessionPhase::Initializing
            ) {
                state.phase = SessionPhase::Anonymous;
                state.user = None;
                state.credentials = None;
                true
            } else {
                false
            }
        };
        if settled {
            self.publish();
        }
    }

    async fn discard_stored(&self, epoch: u64) {
        let _persist = self.persist_lock.lock().await;
        if self.current_epoch() != epoch {
            return;
        }
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear unreadable credentials: {}", e);
        }
    }

    /// Clear the session. With `expected_epoch`, only if no other transition
    /// happened since; returns whether the logout was applied.
    async fn logout(&self, expected_epoch: Option<u64>) -> Result<bool> {
        let was_authenticated = {
            let mut state = self.state.write();
            if let Some(expected) = expected_epoch {
                if state.epoch != expected {
                    return Ok(false);
                }
            }
            state.epoch += 1;
            let was_authenticated = state.user.is_some();
            state.phase = SessionPhase::Anonymous;
            state.user = None;
            state.credentials = None;
            was_authenticated
        };
        self.renewals.cancel();
        self.publish();

        if was_authenticated {
            info!("Logged out");
        } else {
            debug!("Logout with no active session");
        }

        let _persist = self.persist_lock.lock().await;
        self.store.clear().await?;
        Ok(true)
    }

    async fn abandon(&self, epoch: u64, error: RenewalError) -> RenewalOutcome {
        warn!("Credential renewal failed: {}", error);
        match self.logout(Some(epoch)).await {
            Ok(true) => Err(error),
            Ok(false) => Err(RenewalError::Superseded),
            Err(e) => {
                warn!("Forced logout could not clear stored credentials: {}", e);
                Err(error)
            }
        }
    }

    async fn complete_renewal(&self, epoch: u64, refresh_token: &str) -> RenewalOutcome {
        let pair = match self.api.refresh(refresh_token).await {
            Ok(pair) => pair,
            Err(e) => {
                let error = match e {
                    AuthError::Network(message) => RenewalError::Network(message),
                    AuthError::Decode(message) => RenewalError::Malformed(message),
                    AuthError::Api { status, message } => {
                        RenewalError::Rejected(format!("{} {}", status, message))
                    }
                    other => RenewalError::Rejected(other.to_string()),
                };
                return self.abandon(epoch, error).await;
            }
        };

        let claims = match self.decoder.decode(&pair.access_token) {
            Ok(claims) => claims,
            Err(e) => return self.abandon(epoch, RenewalError::Malformed(e.to_string())).await,
        };

        let _persist = self.persist_lock.lock().await;
        if self.current_epoch() != epoch {
            debug!("Discarding renewal result for a session that no longer exists");
            return Err(RenewalError::Superseded);
        }
        if let Err(e) = self.store.save(&pair).await {
            warn!("Renewed credentials could not be persisted: {}", e);
        }

        let access_token = pair.access_token.clone();
        let subject = claims.subject.clone();
        if !self.apply_authenticated(epoch, claims, pair) {
            debug!("Discarding renewal result for a session that no longer exists");
            return Err(RenewalError::Superseded);
        }

        info!("Renewed session credentials for {}", subject);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TokenResponse;
    use crate::token_store::MemoryTokenStore;
    use async_trait::async_trait;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    struct OfflineApi;

    #[async_trait]
    impl AuthApi for OfflineApi {
        async fn login(&self, _request: &LoginRequest) -> Result<TokenResponse> {
            Err(AuthError::Network("offline".to_string()))
        }

        async fn register(&self, _request: &RegistrationRequest) -> Result<String> {
            Err(AuthError::Network("offline".to_string()))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<CredentialPair> {
            Err(AuthError::Network("offline".to_string()))
        }
    }

    fn token(email: &str, role: &str, ttl_secs: i64) -> String {
        let exp = Utc::now().timestamp() + ttl_secs;
        encode(
            &Header::default(),
            &json!({ "sub": email, "role": role, "exp": exp }),
            &EncodingKey::from_secret(b"test"),
        )
        .unwrap()
    }

    fn manager(store: &MemoryTokenStore) -> SessionManager {
        SessionManager::new(Arc::new(store.clone()), Arc::new(OfflineApi))
    }

    #[tokio::test]
    async fn test_new_session_is_initializing_until_determined() {
        let store = MemoryTokenStore::new();
        let sessions = manager(&store);
        assert!(sessions.session().is_initializing);
        assert_eq!(sessions.phase(), SessionPhase::Uninitialized);

        let session = sessions.initialize().await.unwrap();
        assert!(!session.is_initializing);
        assert_eq!(sessions.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let store = MemoryTokenStore::new();
        let sessions = manager(&store);
        sessions.initialize().await.unwrap();

        let access = token("c@example.com", "CUSTOMER", 600);
        let session = sessions.login(&access, "refresh-1").await.unwrap();
        assert_eq!(session.role(), Some(Role::Customer));
        assert_eq!(sessions.access_token().as_deref(), Some(access.as_str()));
        assert!(store.load().await.unwrap().is_some());

        sessions.logout().await.unwrap();
        assert_eq!(sessions.phase(), SessionPhase::Anonymous);
        assert!(sessions.access_token().is_none());
        assert!(store.load().await.unwrap().is_none());

        // Second logout is a quiet no-op.
        sessions.logout().await.unwrap();
        assert_eq!(sessions.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_login_with_malformed_token_changes_nothing() {
        let store = MemoryTokenStore::new();
        let sessions = manager(&store);
        sessions.initialize().await.unwrap();

        let result = sessions.login("not-a-jwt", "refresh").await;
        assert!(matches!(result, Err(AuthError::Decode(_))));
        assert_eq!(sessions.phase(), SessionPhase::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let store = MemoryTokenStore::new();
        let sessions = manager(&store);
        sessions.initialize().await.unwrap();

        // Credentials appearing later are not picked up by a second call.
        store
            .save(&CredentialPair::new(token("late@example.com", "ADMIN", 600), "r"))
            .await
            .unwrap();
        let session = sessions.initialize().await.unwrap();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_offline_startup_renewal_logs_out() {
        let pair = CredentialPair::new(token("gone@example.com", "CUSTOMER", -60), "r");
        let store = MemoryTokenStore::with_pair(&pair);
        let sessions = manager(&store);

        let session = sessions.initialize().await.unwrap();
        assert!(!session.is_authenticated());
        assert!(!session.is_initializing);
        assert!(store.is_empty());
        assert_eq!(sessions.renewals_started(), 1);
    }

    #[tokio::test]
    async fn test_renew_without_refresh_token() {
        let sessions = manager(&MemoryTokenStore::new());
        sessions.initialize().await.unwrap();
        assert_eq!(sessions.renew().await, Err(RenewalError::NoRefreshToken));
        assert_eq!(sessions.renewals_started(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let sessions = manager(&MemoryTokenStore::new());
        let mut rx = sessions.subscribe();
        assert!(rx.borrow().is_initializing);

        sessions.initialize().await.unwrap();
        sessions
            .login(&token("w@example.com", "ADMIN", 600), "r")
            .await
            .unwrap();

        rx.changed().await.unwrap();
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.role(), Some(Role::Admin));
        assert!(!latest.is_initializing);
    }
}
