//! Authentication Routes
//!
//! Registration, login, refresh-token rotation, logout and current-user
//! lookup. Input validation happens here; `AuthService` assumes clean input.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, LoginInput, RegisterInput};
use crate::error::{AppError, ErrorContext, ValidationError};
use crate::middleware::AuthenticatedUser;
use crate::validators::{is_valid_email, is_valid_name, is_valid_password};

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request, used when no refresh cookie is sent
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_ttl: i64,
    pub refresh_ttl: i64,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_ttl: i64,
    pub refresh_ttl: i64,
    pub version: i32,
}

/// Current user information response
#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub name: Option<String>,
}

/// HttpOnly refresh cookie. Secure with SameSite=None over TLS so
/// cross-site frontends can send it; SameSite=Lax over plain HTTP.
fn refresh_cookie(req: &HttpRequest, token: String, ttl_seconds: i64) -> Cookie<'static> {
    let secure = req.connection_info().scheme() == "https";

    Cookie::build(REFRESH_COOKIE_NAME, token)
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(ttl_seconds))
        .secure(secure)
        .same_site(if secure { SameSite::None } else { SameSite::Lax })
        .finish()
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE_NAME, "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid name, email or password
/// - 409: email already registered
/// - 500: internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");
    let form = form.into_inner();

    let name = is_valid_name(&form.name)?;
    let email = is_valid_email(&form.email)?;
    is_valid_password(&form.password)?;

    let result = auth
        .register(RegisterInput {
            name,
            email,
            password: form.password,
        })
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %result.user_id,
        "Registration completed"
    );

    Ok(HttpResponse::Created().json(RegisterResponse {
        user_id: result.user_id,
    }))
}

/// POST /auth/login
///
/// Sets the refresh cookie and returns both tokens.
///
/// # Errors
/// - 400: malformed email or empty password
/// - 401: invalid credentials (unknown email and wrong password alike)
/// - 500: internal server error
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");
    let form = form.into_inner();

    let email = is_valid_email(&form.email)?;
    if form.password.is_empty() {
        return Err(ValidationError::EmptyField("password").into());
    }

    let result = auth
        .login(LoginInput {
            email,
            password: form.password,
        })
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    let refresh_ttl = result.refresh_ttl.num_seconds();
    let cookie = refresh_cookie(&req, result.refresh_token.clone(), refresh_ttl);

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        user_id: result.user_id,
        name: result.name,
        access_token: result.access_token,
        refresh_token: result.refresh_token,
        token_type: "Bearer".to_string(),
        access_ttl: result.access_ttl.num_seconds(),
        refresh_ttl,
    }))
}

/// POST /auth/refresh
///
/// Reads the refresh token from the `refresh_token` cookie, falling back to
/// a JSON body. The presented token is consumed; the response carries its
/// replacement.
///
/// # Errors
/// - 400: no refresh token presented
/// - 401: unknown, reused, expired or revoked refresh token
/// - 500: internal server error
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = req
        .cookie(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.map(|b| b.into_inner().refresh_token))
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::EmptyField("refresh_token"))?;

    let result = auth.refresh(&presented).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    let refresh_ttl = result.refresh_ttl.num_seconds();
    let cookie = refresh_cookie(&req, result.refresh_token.clone(), refresh_ttl);

    Ok(HttpResponse::Ok().cookie(cookie).json(RefreshResponse {
        user_id: result.user_id,
        access_token: result.access_token,
        refresh_token: result.refresh_token,
        token_type: "Bearer".to_string(),
        access_ttl: result.access_ttl.num_seconds(),
        refresh_ttl,
        version: result.version,
    }))
}

/// POST /api/auth/logout
///
/// **Requires a valid access token.** Revokes the session that issued it,
/// which also revokes every access token that session minted.
pub async fn logout(
    user: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout").with_user_id(user.user_id.clone());

    auth.logout(&user.jti).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.user_id,
        "User logged out"
    );

    Ok(HttpResponse::NoContent().cookie(removal_cookie()).finish())
}

/// GET /api/me
///
/// **Requires a valid access token.** Answers from the token alone; the
/// name is absent on tokens renewed through refresh.
pub async fn get_current_user(user: web::ReqData<AuthenticatedUser>) -> HttpResponse {
    let user = user.into_inner();

    HttpResponse::Ok().json(MeResponse {
        user_id: user.user_id,
        name: user.name,
    })
}
