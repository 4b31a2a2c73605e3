//! Credential service.
//!
//! Registers users, verifies login credentials and opens refresh sessions.
//! Rotation lives in `rotation.rs` and revocation in `revocation.rs`; all
//! three extend the same `AuthService`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::auth::jwt::TokenSigner;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::generate_refresh_pair;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::repository::{NewUser, Session, SessionRepository, UserRepository};

/// Source of "now" for session timestamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AuthService {
    pub(crate) users: Arc<dyn UserRepository>,
    pub(crate) sessions: Arc<dyn SessionRepository>,
    pub(crate) signer: TokenSigner,
    pub(crate) hasher: PasswordHasher,
    pub(crate) access_ttl: Duration,
    pub(crate) refresh_ttl: Duration,
    clock: Clock,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterResult {
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        signer: TokenSigner,
        hasher: PasswordHasher,
        jwt: &JwtSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            signer,
            hasher,
            access_ttl: Duration::seconds(jwt.access_token_expiry),
            refresh_ttl: Duration::seconds(jwt.refresh_token_expiry),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for session timestamps
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Register a new user
    ///
    /// Input is expected to be validated already.
    ///
    /// # Errors
    /// - `AuthError::AlreadyExists` if the email is taken
    /// - any other storage or hashing failure as an internal error
    pub async fn register(&self, input: RegisterInput) -> Result<RegisterResult, AppError> {
        let password_hash = self.hasher.hash(&input.password).await?;

        let created = self
            .users
            .create_user(NewUser {
                id: Uuid::new_v4().to_string(),
                name: input.name,
                email: input.email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::UniqueConstraintViolation(_) => AuthError::AlreadyExists.into(),
                other => AppError::Database(other),
            })?;

        tracing::info!(user_id = %created.id, "User registered");

        Ok(RegisterResult {
            user_id: created.id,
        })
    }

    /// Verify credentials and open a new refresh session
    ///
    /// An unknown email and a wrong password both return
    /// `AuthError::InvalidCredentials`, after the same amount of bcrypt work.
    pub async fn login(&self, input: LoginInput) -> Result<LoginResult, AppError> {
        let user = match self.users.get_by_email(&input.email).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                self.hasher.verify_dummy(&input.password).await?;
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e.into()),
        };

        if !self.hasher.verify(&user.password_hash, &input.password).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        // Token claims, session row and ledger entry share one instant
        let now = self.now();
        let (access_token, access_jti) = self.signer.issue(
            &user.id,
            Some(user.name.as_str()),
            now,
            self.access_ttl,
        )?;
        let (refresh_token, refresh_hash) = generate_refresh_pair();

        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            refresh_token_hash: refresh_hash,
            access_jti,
            version: 1,
            issued_at: now,
            expires_at: now + self.refresh_ttl,
            revoked_at: None,
        };

        self.sessions
            .store(&session, now + self.access_ttl)
            .await
            .map_err(|e| match e {
                // Refresh hash collision
                DatabaseError::UniqueConstraintViolation(what) => {
                    AppError::Internal(format!("Session insert collided on {}", what))
                }
                other => AppError::Database(other),
            })?;

        tracing::info!(
            user_id = %user.id,
            session_id = %session.id,
            "User logged in"
        );

        Ok(LoginResult {
            user_id: user.id,
            name: user.name,
            access_token,
            refresh_token,
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::repository::{InMemorySessionRepository, InMemoryUserRepository};

    pub const TEST_HASH_COST: u32 = 4;

    pub fn jwt_settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 600,
            refresh_token_expiry: 3600,
            issuer: "test".to_string(),
        }
    }

    pub struct Harness {
        pub service: Arc<AuthService>,
        pub users: Arc<InMemoryUserRepository>,
        pub sessions: Arc<InMemorySessionRepository>,
    }

    pub fn harness() -> Harness {
        harness_with(|service| service)
    }

    pub fn harness_with(configure: impl FnOnce(AuthService) -> AuthService) -> Harness {
        let users = Arc::new(InMemoryUserRepository::new());
        let sessions = Arc::new(InMemorySessionRepository::new());
        let settings = jwt_settings();
        let service = AuthService::new(
            users.clone(),
            sessions.clone(),
            TokenSigner::new(&settings),
            PasswordHasher::new(TEST_HASH_COST).unwrap(),
            &settings,
        );

        Harness {
            service: Arc::new(configure(service)),
            users,
            sessions,
        }
    }

    pub async fn register_alice(service: &AuthService) -> String {
        service
            .register(RegisterInput {
                name: "Alice".to_string(),
                email: "alice@x.com".to_string(),
                password: "password123".to_string(),
            })
            .await
            .unwrap()
            .user_id
    }

    pub async fn login_alice(service: &AuthService) -> LoginResult {
        service
            .login(LoginInput {
                email: "alice@x.com".to_string(),
                password: "password123".to_string(),
            })
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::auth::refresh_token::hash_token;
    use crate::repository::SessionRepository;

    #[tokio::test]
    async fn test_register_returns_new_user_id() {
        let h = harness();

        let user_id = register_alice(&h.service).await;

        let stored = h.users.get_by_email("alice@x.com").await.unwrap();
        assert_eq!(stored.id, user_id);
        assert_eq!(stored.name, "Alice");
        assert!(!stored.email_confirmed);
        assert_ne!(stored.password_hash, "password123");
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected_and_leaves_user_untouched() {
        let h = harness();
        register_alice(&h.service).await;
        let before = h.users.get_by_email("alice@x.com").await.unwrap();

        let result = h
            .service
            .register(RegisterInput {
                name: "Mallory".to_string(),
                email: "alice@x.com".to_string(),
                password: "different-password".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Auth(AuthError::AlreadyExists))));
        assert_eq!(h.users.get_by_email("alice@x.com").await.unwrap(), before);
        assert_eq!(h.users.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_login_issues_tokens_and_opens_session() {
        let h = harness();
        let user_id = register_alice(&h.service).await;

        let login = login_alice(&h.service).await;

        assert_eq!(login.user_id, user_id);
        assert_eq!(login.name, "Alice");
        assert_eq!(login.access_ttl, Duration::seconds(600));
        assert_eq!(login.refresh_ttl, Duration::seconds(3600));

        let claims = h.service.signer().parse(&login.access_token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username.as_deref(), Some("Alice"));

        let session = h
            .sessions
            .get_by_refresh_token_hash(&hash_token(&login.refresh_token))
            .await
            .unwrap();
        assert_eq!(session.version, 1);
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.access_jti, claims.jti);
        assert_eq!(session.expires_at - session.issued_at, Duration::seconds(3600));
        assert!(session.revoked_at.is_none());
        assert_eq!(h.sessions.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_raw_refresh_token_is_not_stored() {
        let h = harness();
        register_alice(&h.service).await;

        let login = login_alice(&h.service).await;

        let result = h
            .sessions
            .get_by_refresh_token_hash(&login.refresh_token)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_are_indistinguishable() {
        let h = harness();
        register_alice(&h.service).await;

        let wrong_password = h
            .service
            .login(LoginInput {
                email: "alice@x.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .await;
        let unknown_email = h
            .service
            .login(LoginInput {
                email: "bob@x.com".to_string(),
                password: "password123".to_string(),
            })
            .await;

        assert!(matches!(
            wrong_password,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));
        assert!(matches!(
            unknown_email,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));
        assert_eq!(h.sessions.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_each_login_opens_its_own_session() {
        let h = harness();
        register_alice(&h.service).await;

        let first = login_alice(&h.service).await;
        let second = login_alice(&h.service).await;

        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(h.sessions.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_login_rejects_password_sharing_a_72_byte_prefix() {
        let h = harness();
        let prefix = "a".repeat(72);
        h.service
            .register(RegisterInput {
                name: "Alice".to_string(),
                email: "alice@x.com".to_string(),
                password: prefix.clone(),
            })
            .await
            .unwrap();

        let result = h
            .service
            .login(LoginInput {
                email: "alice@x.com".to_string(),
                password: format!("{}WRONG", prefix),
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));
        assert_eq!(h.sessions.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_refuses_password_bcrypt_would_truncate() {
        let h = harness();

        let result = h
            .service
            .register(RegisterInput {
                name: "Alice".to_string(),
                email: "alice@x.com".to_string(),
                password: format!("{}correct-tail", "a".repeat(72)),
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(h.users.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_access_token_times_follow_service_clock() {
        let fixed = Utc::now() - Duration::seconds(30);
        let h = harness_with(move |service| service.with_clock(Arc::new(move || fixed)));
        let user_id = register_alice(&h.service).await;

        let login = login_alice(&h.service).await;

        let claims = h.service.signer().parse(&login.access_token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iat, fixed.timestamp());
        assert_eq!(claims.exp, (fixed + Duration::seconds(600)).timestamp());

        let session = h
            .sessions
            .get_by_refresh_token_hash(&hash_token(&login.refresh_token))
            .await
            .unwrap();
        assert_eq!(session.issued_at.timestamp(), claims.iat);
    }
}
