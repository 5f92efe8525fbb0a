//! Local decoding of access token claims
//!
//! The signature is not verified here. Trust in the token comes from it
//! having been issued by the server over a trusted channel; the server stays
//! the authority for every call it receives. Expiry is also not enforced by
//! [`ClaimsDecoder::decode`], callers compare with [`ClaimsDecoder::is_expired`].

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AuthError, Result};
use crate::types::Role;

/// Identity and role carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user's email
    pub subject: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Wire shape of the token payload
#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    role: Role,
    exp: i64,
}

/// Extracts [`Claims`] from a compact JWT without contacting the server
#[derive(Clone)]
pub struct ClaimsDecoder {
    validation: Validation,
    key: DecodingKey,
}

impl ClaimsDecoder {
    pub fn new() -> Self {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            validation,
            key: DecodingKey::from_secret(&[]),
        }
    }

    /// Decode the claims of `access_token`.
    ///
    /// Fails with [`AuthError::Decode`] when the token is not a three-part
    /// JWT, the payload is not JSON, or `sub`/`role`/`exp` are missing or of
    /// the wrong type.
    pub fn decode(&self, access_token: &str) -> Result<Claims> {
        let data = decode::<TokenClaims>(access_token, &self.key, &self.validation)
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        let claims = data.claims;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Decode(format!("exp out of range: {}", claims.exp)))?;

        Ok(Claims {
            subject: claims.sub,
            role: claims.role,
            expires_at,
        })
    }

    /// Pure comparison of `expires_at` against `now`
    pub fn is_expired(claims: &Claims, now: DateTime<Utc>) -> bool {
        claims.expires_at < now
    }
}

impl Default for ClaimsDecoder {
    fn default() -> Self {
        Self::new()
    }
}
