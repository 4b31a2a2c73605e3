//! Authentication module
//!
//! Password hashing, access-token signing, refresh-token generation, and the
//! `AuthService` that ties them to the user and session stores.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod revocation;
mod rotation;
mod service;

pub use claims::Claims;
pub use jwt::TokenSigner;
pub use password::PasswordHasher;
pub use refresh_token::{generate_refresh_token, hash_token};
pub use rotation::RefreshResult;
pub use service::{AuthService, Clock, LoginInput, LoginResult, RegisterInput, RegisterResult};
