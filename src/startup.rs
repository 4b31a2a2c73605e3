use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, TokenSigner};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::repository::{SessionRepository, UserRepository};
use crate::routes::{get_current_user, health_check, login, logout, refresh, register};

/// actix access-log line: method, path without query string, status, latency
const ACCESS_LOG_FORMAT: &str = "%m %U %s %Dms";

/// Wires the signer and hasher from settings around the given stores.
///
/// # Errors
/// `AppError::Config` if the jwt or password sections are unusable
pub fn build_auth_service(
    settings: &Settings,
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
) -> Result<AuthService, AppError> {
    settings.validate()?;

    let signer = TokenSigner::new(&settings.jwt);
    let hasher = PasswordHasher::new(settings.password.hash_cost)?;

    Ok(AuthService::new(
        users,
        sessions,
        signer,
        hasher,
        &settings.jwt,
    ))
}

pub fn run(listener: TcpListener, auth: AuthService) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(auth);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::new(ACCESS_LOG_FORMAT))
            .wrap(LoggerMiddleware)
            .app_data(auth.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh)),
            )
            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(auth.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/auth/logout", web::post().to(logout)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
