//! # Auth-Core - Client Session Management for the Rental Client
//!
//! This crate owns the full lifecycle of a client-side authentication
//! session: acquiring credentials, deriving identity and role from the
//! access token, persisting the session across restarts, renewing it
//! transparently when it expires, and gating role-restricted navigation.
//!
//! ## Components
//!
//! - [`TokenStore`] - durable key/value persistence of the credential pair
//! - [`ClaimsDecoder`] - local extraction of subject, role and expiry
//! - [`SessionManager`] - authoritative session state and its transitions
//! - [`RequestAuthorizer`] - bearer attachment with one coordinated
//!   renewal-and-retry on `401`
//! - [`RouteGuard`] - admit / redirect decisions from a session snapshot
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rental_auth_core::{
//!     AuthConfig, FileTokenStore, HttpAuthApi, RequestAuthorizer, RouteGuard, SessionManager,
//!     ApiRequest, Admission,
//! };
//!
//! # async fn run() -> rental_auth_core::Result<()> {
//! let config = AuthConfig::load(None)?;
//! let api = HttpAuthApi::new(config.base_url()?, config.request_timeout())?;
//! let store = FileTokenStore::new(&config.token_store_path);
//!
//! let sessions = SessionManager::new(Arc::new(store), Arc::new(api));
//! sessions.initialize().await?;
//!
//! let authorizer = RequestAuthorizer::new(sessions.clone(), config.base_url()?, config.request_timeout())?;
//! let bookings: serde_json::Value = authorizer.send_json(&ApiRequest::get("/bookings/customer")).await?;
//!
//! let guard = RouteGuard::new(config.login_route.clone());
//! if guard.check_path("/admin-dashboard", &sessions.session()) != Admission::Admit {
//!     println!("redirecting");
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod authorizer;
pub mod claims;
pub mod config;
pub mod error;
pub mod guard;
pub mod renewal;
pub mod session;
pub mod token_store;
pub mod types;

pub use api::{AuthApi, HttpAuthApi, TokenResponse};
pub use authorizer::{ApiRequest, ApiResponse, RequestAuthorizer};
pub use claims::{Claims, ClaimsDecoder};
pub use crate::config::AuthConfig;
pub use error::{AuthError, RenewalError, Result};
pub use guard::{Admission, RouteGuard, RouteTable};
pub use renewal::RenewalOutcome;
pub use session::{Session, SessionManager, SessionPhase, SessionUser};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{
    AdminRegistrationRequest, ChangePasswordRequest, CredentialPair, LoginRequest,
    RegistrationRequest, Role,
};
