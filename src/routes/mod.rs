mod auth;
mod health_check;

pub use auth::{get_current_user, login, logout, refresh, register, REFRESH_COOKIE_NAME};
pub use health_check::health_check;
