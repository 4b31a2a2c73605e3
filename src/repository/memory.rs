//! In-memory repositories for tests and local development.
//!
//! Each repository keeps its state behind one `tokio::sync::RwLock`; every
//! conditional write checks and mutates under a single write guard.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{NewUser, RotateSession, Session, SessionRepository, User, UserRepository};
use crate::error::DatabaseError;

#[derive(Default)]
pub struct InMemoryUserRepository {
    // email -> user
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "users_email_key".to_string(),
            ));
        }
        if users.values().any(|existing| existing.id == user.id) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "users_pkey".to_string(),
            ));
        }

        let created = User {
            id: user.id,
            name: user.name,
            email: user.email,
            email_confirmed: false,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        users.insert(created.email.clone(), created.clone());

        Ok(created)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        self.users
            .read()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()))
    }
}

struct AccessTokenEntry {
    session_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, Session>,
    // refresh token hash -> session id
    by_hash: HashMap<String, String>,
    // access jti -> owning session
    access_tokens: HashMap<String, AccessTokenEntry>,
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    state: RwLock<SessionState>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of session rows, live or dead
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Number of recorded access JTIs
    pub async fn access_token_count(&self) -> usize {
        self.state.read().await.access_tokens.len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn store(
        &self,
        session: &Session,
        access_expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;

        if state.sessions.contains_key(&session.id) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "sessions_pkey".to_string(),
            ));
        }
        if state.by_hash.contains_key(&session.refresh_token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "sessions_refresh_token_hash_key".to_string(),
            ));
        }
        if state.access_tokens.contains_key(&session.access_jti) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "session_access_tokens_pkey".to_string(),
            ));
        }

        state
            .by_hash
            .insert(session.refresh_token_hash.clone(), session.id.clone());
        state.access_tokens.insert(
            session.access_jti.clone(),
            AccessTokenEntry {
                session_id: session.id.clone(),
                expires_at: access_expires_at,
            },
        );
        state.sessions.insert(session.id.clone(), session.clone());

        Ok(())
    }

    async fn get_by_refresh_token_hash(&self, hash: &str) -> Result<Session, DatabaseError> {
        let state = self.state.read().await;

        state
            .by_hash
            .get(hash)
            .and_then(|id| state.sessions.get(id))
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound("session".to_string()))
    }

    async fn rotate(&self, rotation: &RotateSession) -> Result<Session, DatabaseError> {
        let mut state = self.state.write().await;

        if state.by_hash.contains_key(&rotation.refresh_token_hash)
            || state.access_tokens.contains_key(&rotation.access_jti)
        {
            return Err(DatabaseError::UniqueConstraintViolation(
                "session rotation".to_string(),
            ));
        }

        let session = match state.sessions.get_mut(&rotation.session_id) {
            Some(session)
                if session.version == rotation.expected_version
                    && session.is_live_at(rotation.issued_at) =>
            {
                session
            }
            _ => return Err(DatabaseError::NotFound("session".to_string())),
        };

        let old_hash = std::mem::replace(
            &mut session.refresh_token_hash,
            rotation.refresh_token_hash.clone(),
        );
        session.access_jti = rotation.access_jti.clone();
        session.issued_at = rotation.issued_at;
        session.expires_at = rotation.expires_at;
        session.version += 1;
        let updated = session.clone();

        state.by_hash.remove(&old_hash);
        state
            .by_hash
            .insert(rotation.refresh_token_hash.clone(), rotation.session_id.clone());

        let now = rotation.issued_at;
        state
            .access_tokens
            .retain(|_, entry| entry.session_id != rotation.session_id || entry.expires_at > now);
        state.access_tokens.insert(
            rotation.access_jti.clone(),
            AccessTokenEntry {
                session_id: rotation.session_id.clone(),
                expires_at: rotation.access_expires_at,
            },
        );

        Ok(updated)
    }

    async fn is_access_revoked(&self, access_jti: &str) -> Result<bool, DatabaseError> {
        let state = self.state.read().await;

        Ok(state
            .access_tokens
            .get(access_jti)
            .and_then(|entry| state.sessions.get(&entry.session_id))
            .map(Session::is_revoked)
            .unwrap_or(false))
    }

    async fn revoke_by_access_jti(
        &self,
        access_jti: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;

        let session_id = match state.access_tokens.get(access_jti) {
            Some(entry) => entry.session_id.clone(),
            None => return Ok(false),
        };

        match state.sessions.get_mut(&session_id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(revoked_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
