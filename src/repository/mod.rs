//! Storage collaborator
//!
//! Narrow async interfaces over the user and session tables. Implementations
//! report a missing row as `DatabaseError::NotFound` and a uniqueness
//! violation as `DatabaseError::UniqueConstraintViolation`; the services
//! translate those into their own business errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

pub mod memory;
pub mod postgres;

pub use memory::{InMemorySessionRepository, InMemoryUserRepository};
pub use postgres::{PgSessionRepository, PgUserRepository};

/// Registered user
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_confirmed: bool,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new user; `email_confirmed` starts false and
/// `created_at` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Refresh session. One row per login, mutated in place by every rotation.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub refresh_token_hash: String,
    pub access_jti: String,
    pub version: i32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Neither revoked nor expired at `now`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}

/// Conditional in-place update of a session.
///
/// Applies only if the row still has `expected_version`, is unrevoked and
/// has not expired at `issued_at`. The version then becomes
/// `expected_version + 1`.
#[derive(Debug, Clone)]
pub struct RotateSession {
    pub session_id: String,
    pub expected_version: i32,
    pub refresh_token_hash: String,
    pub access_jti: String,
    pub access_expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; a duplicate email is a `UniqueConstraintViolation`
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError>;

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session and record its first access JTI, atomically
    async fn store(
        &self,
        session: &Session,
        access_expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn get_by_refresh_token_hash(&self, hash: &str) -> Result<Session, DatabaseError>;

    /// Atomic compare-and-swap on the session row. A row that is gone,
    /// revoked, expired or already rotated past `expected_version` yields
    /// `NotFound`.
    async fn rotate(&self, rotation: &RotateSession) -> Result<Session, DatabaseError>;

    /// True when `access_jti` was issued under a session that has since been
    /// revoked. Unknown JTIs are not revoked.
    async fn is_access_revoked(&self, access_jti: &str) -> Result<bool, DatabaseError>;

    /// Revoke the live session that issued `access_jti`. Returns whether a
    /// session was revoked by this call.
    async fn revoke_by_access_jti(
        &self,
        access_jti: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}
