//! Access-token revocation.
//!
//! Access tokens stay self-contained; revocation is a lookup keyed by JTI,
//! done on every authenticated request. A JTI the store has never seen is
//! not revoked, so tokens minted before tracking existed live out their
//! natural expiry.

use crate::auth::claims::Claims;
use crate::auth::service::AuthService;
use crate::error::{AppError, AuthError};

impl AuthService {
    /// Whether the access token identified by `access_jti` has been revoked
    pub async fn is_revoked(&self, access_jti: &str) -> Result<bool, AppError> {
        if access_jti.is_empty() {
            return Ok(false);
        }

        Ok(self.sessions.is_access_revoked(access_jti).await?)
    }

    /// Validate a bearer token and check it against the revocation store
    ///
    /// # Errors
    /// - `AuthError::InvalidToken` if signature, structure or expiry fail
    /// - `AuthError::TokenRevoked` if its session has been revoked
    /// - storage failures as internal errors
    pub async fn authenticate(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.signer.parse(token)?;

        if claims.has_jti() && self.is_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked.into());
        }

        Ok(claims)
    }

    /// End the session that issued `access_jti`
    ///
    /// Idempotent: logging out twice, or with a token whose session is
    /// already dead, succeeds without effect.
    pub async fn logout(&self, access_jti: &str) -> Result<(), AppError> {
        if access_jti.is_empty() {
            return Ok(());
        }

        let revoked = self
            .sessions
            .revoke_by_access_jti(access_jti, self.now())
            .await?;

        if revoked {
            tracing::info!(access_jti = %access_jti, "Session revoked");
        } else {
            tracing::debug!(access_jti = %access_jti, "No live session to revoke");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::test_support::*;

    #[tokio::test]
    async fn test_logout_revokes_current_access_token() {
        let h = harness();
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;
        let jti = h.service.signer().parse(&login.access_token).unwrap().jti;

        assert!(!h.service.is_revoked(&jti).await.unwrap());
        h.service.logout(&jti).await.unwrap();

        assert!(h.service.is_revoked(&jti).await.unwrap());
        assert!(!h.service.is_revoked("unrelated-jti").await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_revokes_superseded_access_tokens() {
        let h = harness();
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;
        let refreshed = h.service.refresh(&login.refresh_token).await.unwrap();

        // Still valid after rotation, until the session dies
        assert!(h.service.authenticate(&login.access_token).await.is_ok());

        let current = h.service.signer().parse(&refreshed.access_token).unwrap().jti;
        h.service.logout(&current).await.unwrap();

        assert!(matches!(
            h.service.authenticate(&login.access_token).await,
            Err(AppError::Auth(AuthError::TokenRevoked))
        ));
        assert!(matches!(
            h.service.authenticate(&refreshed.access_token).await,
            Err(AppError::Auth(AuthError::TokenRevoked))
        ));
    }

    #[tokio::test]
    async fn test_logout_leaves_other_sessions_alone() {
        let h = harness();
        register_alice(&h.service).await;
        let laptop = login_alice(&h.service).await;
        let phone = login_alice(&h.service).await;
        let laptop_jti = h.service.signer().parse(&laptop.access_token).unwrap().jti;

        h.service.logout(&laptop_jti).await.unwrap();

        assert!(h.service.authenticate(&phone.access_token).await.is_ok());
        assert!(h.service.refresh(&phone.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let h = harness();
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;
        let jti = h.service.signer().parse(&login.access_token).unwrap().jti;

        h.service.logout(&jti).await.unwrap();
        h.service.logout(&jti).await.unwrap();
        h.service.logout("").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_jti_is_never_revoked() {
        let h = harness();

        assert!(!h.service.is_revoked("").await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_garbage() {
        let h = harness();

        assert!(matches!(
            h.service.authenticate("not-a-token").await,
            Err(AppError::Auth(AuthError::InvalidToken))
        ));
    }
}
