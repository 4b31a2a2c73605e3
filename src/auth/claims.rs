//! JWT Claims structure
//!
//! Payload of an access token: registered claims (RFC 7519) plus an optional
//! display name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Unique token identifier, the key for revocation lookups.
    /// Tokens minted before revocation tracking carry none.
    #[serde(default)]
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Display name, only present on tokens minted at login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Claims {
    /// Create new claims valid from `issued_at` for `expiry_seconds`
    ///
    /// # Arguments
    /// * `user_id` - Subject of the token
    /// * `jti` - Unique token identifier
    /// * `username` - Optional display name
    /// * `issued_at` - Issuance instant
    /// * `expiry_seconds` - Token lifetime in seconds
    /// * `issuer` - Issuer identifier
    pub fn new(
        user_id: &str,
        jti: String,
        username: Option<String>,
        issued_at: DateTime<Utc>,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = issued_at.timestamp();
        Self {
            sub: user_id.to_string(),
            jti,
            iat: now,
            exp: now + expiry_seconds,
            iss: issuer,
            username,
        }
    }

    /// Whether the token carries an identifier that can be checked for
    /// revocation
    pub fn has_jti(&self) -> bool {
        !self.jti.is_empty()
    }
}
