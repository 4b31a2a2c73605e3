//! Refresh-token rotation.
//!
//! A refresh token is usable exactly once. The session row found by the
//! token's hash is rewritten in place (new hash, new access JTI, new
//! timestamps, version + 1) through the repository's compare-and-swap, so of
//! two concurrent refreshes with the same token at most one succeeds.

use chrono::Duration;

use crate::auth::refresh_token::{generate_refresh_pair, hash_token};
use crate::auth::service::AuthService;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::repository::RotateSession;

#[derive(Debug, Clone)]
pub struct RefreshResult {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub version: i32,
}

impl AuthService {
    /// Exchange a refresh token for a new access/refresh pair
    ///
    /// # Errors
    /// `AuthError::SessionNotFound` when the token is unknown, already
    /// rotated, expired, revoked, or loses a concurrent rotation. The causes
    /// are deliberately indistinguishable to the caller.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult, AppError> {
        let refresh_hash = hash_token(refresh_token);

        let session = self
            .sessions
            .get_by_refresh_token_hash(&refresh_hash)
            .await
            .map_err(session_not_found)?;

        let now = self.now();
        if !session.is_live_at(now) {
            tracing::debug!(
                session_id = %session.id,
                revoked = session.is_revoked(),
                "Refresh attempted on dead session"
            );
            return Err(AuthError::SessionNotFound.into());
        }

        // The user record is not re-read here, so renewed tokens carry no
        // display name.
        let (access_token, access_jti) =
            self.signer
                .issue(&session.user_id, None, now, self.access_ttl)?;
        let (new_refresh_token, new_refresh_hash) = generate_refresh_pair();

        let updated = self
            .sessions
            .rotate(&RotateSession {
                session_id: session.id.clone(),
                expected_version: session.version,
                refresh_token_hash: new_refresh_hash,
                access_jti,
                access_expires_at: now + self.access_ttl,
                issued_at: now,
                expires_at: now + self.refresh_ttl,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => {
                    tracing::info!(
                        session_id = %session.id,
                        "Session rotation lost to a concurrent refresh or revocation"
                    );
                    AuthError::SessionNotFound.into()
                }
                DatabaseError::UniqueConstraintViolation(what) => {
                    AppError::Internal(format!("Session rotation collided on {}", what))
                }
                other => AppError::Database(other),
            })?;

        tracing::info!(
            user_id = %updated.user_id,
            session_id = %updated.id,
            version = updated.version,
            "Session rotated"
        );

        Ok(RefreshResult {
            user_id: updated.user_id,
            access_token,
            refresh_token: new_refresh_token,
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
            version: updated.version,
        })
    }
}

fn session_not_found(err: DatabaseError) -> AppError {
    match err {
        DatabaseError::NotFound(_) => AuthError::SessionNotFound.into(),
        other => AppError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::auth::service::test_support::*;
    use crate::repository::SessionRepository;

    fn is_session_not_found<T>(result: &Result<T, AppError>) -> bool {
        matches!(result, Err(AppError::Auth(AuthError::SessionNotFound)))
    }

    #[tokio::test]
    async fn test_refresh_rotates_once() {
        let h = harness();
        let user_id = register_alice(&h.service).await;
        let login = login_alice(&h.service).await;

        let first = h.service.refresh(&login.refresh_token).await.unwrap();
        assert_eq!(first.user_id, user_id);
        assert_eq!(first.version, 2);
        assert_ne!(first.refresh_token, login.refresh_token);

        let replay = h.service.refresh(&login.refresh_token).await;
        assert!(is_session_not_found(&replay));

        let second = h.service.refresh(&first.refresh_token).await.unwrap();
        assert_eq!(second.version, 3);
        assert_eq!(h.sessions.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_version_tracks_refresh_count() {
        let h = harness();
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;

        let mut token = login.refresh_token;
        for n in 1..=5 {
            let result = h.service.refresh(&token).await.unwrap();
            assert_eq!(result.version, n + 1);
            token = result.refresh_token;
        }
    }

    #[tokio::test]
    async fn test_renewed_token_has_no_display_name() {
        let h = harness();
        let user_id = register_alice(&h.service).await;
        let login = login_alice(&h.service).await;

        let result = h.service.refresh(&login.refresh_token).await.unwrap();
        let claims = h.service.signer().parse(&result.access_token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert!(claims.username.is_none());

        let session = h
            .sessions
            .get_by_refresh_token_hash(&hash_token(&result.refresh_token))
            .await
            .unwrap();
        assert_eq!(session.access_jti, claims.jti);
    }

    #[tokio::test]
    async fn test_unknown_token_is_session_not_found() {
        let h = harness();

        let result = h.service.refresh("never-issued").await;

        assert!(is_session_not_found(&result));
    }

    #[tokio::test]
    async fn test_revoked_session_cannot_rotate() {
        let h = harness();
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;
        let jti = h.service.signer().parse(&login.access_token).unwrap().jti;

        h.service.logout(&jti).await.unwrap();
        let result = h.service.refresh(&login.refresh_token).await;

        assert!(is_session_not_found(&result));
    }

    #[tokio::test]
    async fn test_expired_session_cannot_rotate() {
        let now: Arc<Mutex<DateTime<Utc>>> = Arc::new(Mutex::new(Utc::now()));
        let clock = now.clone();
        let h = harness_with(move |service| {
            service.with_clock(Arc::new(move || *clock.lock().unwrap()))
        });
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;

        *now.lock().unwrap() += Duration::seconds(3601);
        let result = h.service.refresh(&login.refresh_token).await;

        assert!(is_session_not_found(&result));
    }

    #[tokio::test]
    async fn test_rotation_extends_session_expiry() {
        let now: Arc<Mutex<DateTime<Utc>>> = Arc::new(Mutex::new(Utc::now()));
        let clock = now.clone();
        let h = harness_with(move |service| {
            service.with_clock(Arc::new(move || *clock.lock().unwrap()))
        });
        register_alice(&h.service).await;
        let login = login_alice(&h.service).await;

        *now.lock().unwrap() += Duration::seconds(3000);
        let first = h.service.refresh(&login.refresh_token).await.unwrap();

        // Past the original expiry, within the renewed one
        *now.lock().unwrap() += Duration::seconds(3000);
        let second = h.service.refresh(&first.refresh_token).await.unwrap();

        assert_eq!(second.version, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_has_single_winner() {
        let h = harness();
        register_alice(&h.service).await;

        for _ in 0..10 {
            let login = login_alice(&h.service).await;

            let attempts: Vec<_> = (0..4)
                .map(|_| {
                    let service = h.service.clone();
                    let token = login.refresh_token.clone();
                    tokio::spawn(async move { service.refresh(&token).await })
                })
                .collect();

            let mut successes = 0;
            for attempt in attempts {
                let result = attempt.await.unwrap();
                match result {
                    Ok(refreshed) => {
                        assert_eq!(refreshed.version, 2);
                        successes += 1;
                    }
                    Err(e) => assert!(matches!(e, AppError::Auth(AuthError::SessionNotFound))),
                }
            }

            assert_eq!(successes, 1);
        }
    }
}
