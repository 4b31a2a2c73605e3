//! Postgres-backed repositories.
//!
//! Session rotation is a single transaction whose `UPDATE ... RETURNING`
//! carries the whole condition, so two rotations of the same row cannot
//! both apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{NewUser, RotateSession, Session, SessionRepository, User, UserRepository};
use crate::error::DatabaseError;

const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token_hash, access_jti, version, issued_at, expires_at, revoked_at";

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, email_confirmed, password_hash, created_at)
            VALUES ($1, $2, $3, false, $4, $5)
            RETURNING id, name, email, email_confirmed, password_hash, created_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, email_confirmed, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or_else(|| DatabaseError::NotFound("user".to_string()))
    }
}

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn store(
        &self,
        session: &Session,
        access_expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, refresh_token_hash, access_jti, version, issued_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.access_jti)
        .bind(session.version)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .execute(&mut tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_access_tokens (jti, session_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&session.access_jti)
        .bind(&session.id)
        .bind(access_expires_at)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_refresh_token_hash(&self, hash: &str) -> Result<Session, DatabaseError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE refresh_token_hash = $1",
            SESSION_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        session.ok_or_else(|| DatabaseError::NotFound("session".to_string()))
    }

    async fn rotate(&self, rotation: &RotateSession) -> Result<Session, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions
            SET refresh_token_hash = $3,
                access_jti = $4,
                issued_at = $5,
                expires_at = $6,
                version = version + 1
            WHERE id = $1
              AND version = $2
              AND revoked_at IS NULL
              AND expires_at > $5
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(&rotation.session_id)
        .bind(rotation.expected_version)
        .bind(&rotation.refresh_token_hash)
        .bind(&rotation.access_jti)
        .bind(rotation.issued_at)
        .bind(rotation.expires_at)
        .fetch_optional(&mut tx)
        .await?;

        let updated = match updated {
            Some(session) => session,
            None => {
                tx.rollback().await?;
                return Err(DatabaseError::NotFound("session".to_string()));
            }
        };

        // Ledger entries for access tokens that can no longer be presented
        sqlx::query(
            r#"
            DELETE FROM session_access_tokens
            WHERE session_id = $1 AND expires_at <= $2
            "#,
        )
        .bind(&rotation.session_id)
        .bind(rotation.issued_at)
        .execute(&mut tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_access_tokens (jti, session_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&rotation.access_jti)
        .bind(&rotation.session_id)
        .bind(rotation.access_expires_at)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn is_access_revoked(&self, access_jti: &str) -> Result<bool, DatabaseError> {
        let revoked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM session_access_tokens t
                JOIN sessions s ON s.id = t.session_id
                WHERE t.jti = $1 AND s.revoked_at IS NOT NULL
            )
            "#,
        )
        .bind(access_jti)
        .fetch_one(&self.pool)
        .await?;

        Ok(revoked)
    }

    async fn revoke_by_access_jti(
        &self,
        access_jti: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = $2
            WHERE revoked_at IS NULL
              AND id = (SELECT session_id FROM session_access_tokens WHERE jti = $1)
            "#,
        )
        .bind(access_jti)
        .bind(revoked_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
