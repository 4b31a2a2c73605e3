//! JWT Token Generation and Validation
//!
//! HS256 access tokens signed with the process-wide secret. Rotating the
//! secret invalidates every outstanding token.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Issues and parses access tokens.
///
/// Keys are derived once from the configured secret; the signer is cheap to
/// clone and read-only afterwards.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl TokenSigner {
    pub fn new(config: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        }
    }

    /// Issue a new access token
    ///
    /// # Arguments
    /// * `subject` - User ID the token asserts
    /// * `display_name` - Optional name embedded as the `username` claim
    /// * `issued_at` - Issuance instant, from the caller's clock
    /// * `ttl` - Lifetime from `issued_at`
    ///
    /// # Returns
    /// The encoded token and its freshly generated JTI
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn issue(
        &self,
        subject: &str,
        display_name: Option<&str>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(String, String), AppError> {
        let jti = Uuid::new_v4().to_string();
        let claims = Claims::new(
            subject,
            jti.clone(),
            display_name.map(str::to_string),
            issued_at,
            ttl.num_seconds(),
            self.issuer.clone(),
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok((token, jti))
    }

    /// Validate a token and extract its claims
    ///
    /// # Errors
    /// Bad signature, malformed structure, wrong issuer and elapsed expiry
    /// all return `AuthError::InvalidToken`
    pub fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                AuthError::InvalidToken
            })
    }
}
