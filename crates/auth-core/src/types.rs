//! Core types shared across the session core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role carried in the `role` claim of an access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    /// Landing page for a freshly authenticated user of this role
    pub fn home_route(&self) -> &'static str {
        match self {
            Role::Customer => "/customer-dashboard",
            Role::Admin => "/admin-dashboard",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Access/refresh token pair.
///
/// The two values are always replaced together: a refresh yields both.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens are bearer secrets; keep them out of Debug output and therefore logs.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
}

/// Body of `POST /auth/register` (customer self-registration)
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl RegistrationRequest {
    pub fn customer(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: Role::Customer,
        }
    }
}

/// Body of `POST /auth/admin/register`, issued by an authenticated admin
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRegistrationRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub employee_id: String,
}

impl AdminRegistrationRequest {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        employee_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: Role::Admin,
            employee_id: employee_id.into(),
        }
    }
}

/// Body of `POST /auth/change-password`
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangePasswordRequest { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"CUSTOMER\"").unwrap();
        assert_eq!(role, Role::Customer);
        assert!(serde_json::from_str::<Role>("\"GUEST\"").is_err());
    }

    #[test]
    fn test_role_home_routes() {
        assert_eq!(Role::Admin.home_route(), "/admin-dashboard");
        assert_eq!(Role::Customer.home_route(), "/customer-dashboard");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_login_request_omits_missing_employee_id() {
        let request = LoginRequest {
            email: "a@b.c".to_string(),
            password: "secret1".to_string(),
            role: Role::Customer,
            employee_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["role"], "CUSTOMER");
        assert!(json.get("employeeId").is_none());

        let admin = AdminRegistrationRequest::new("x@y.z", "secret1", "E-7");
        let json = serde_json::to_value(&admin).unwrap();
        assert_eq!(json["employeeId"], "E-7");
        assert_eq!(json["role"], "ADMIN");
    }

    #[test]
    fn test_credential_pair_debug_is_redacted() {
        let pair = CredentialPair::new("secret-access", "secret-refresh");
        let shown = format!("{:?}", pair);
        assert!(!shown.contains("secret-access"));
        assert!(!shown.contains("secret-refresh"));
    }
}
