use config::ConfigError;

use crate::error::ConfigError as SettingsError;

/// Placeholder secret shipped in `configuration.yaml`; never valid at runtime.
pub const PLACEHOLDER_SECRET: &str = "change-me";

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
}

impl Settings {
    /// Checks every section the auth service depends on
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.jwt.validate()?;
        self.password.validate()
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64,   // seconds (e.g., 600 for 10 minutes)
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64,  // seconds (e.g., 2592000 for 30 days)
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl JwtSettings {
    /// Refuses settings the service must never run with: an empty or
    /// placeholder secret, or a non-positive token lifetime.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.secret.trim().is_empty() {
            return Err(SettingsError::MissingRequired("jwt.secret".to_string()));
        }
        if self.secret == PLACEHOLDER_SECRET {
            return Err(SettingsError::InvalidValue(
                "jwt.secret must be changed from its default value".to_string(),
            ));
        }
        if self.access_token_expiry <= 0 {
            return Err(SettingsError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.refresh_token_expiry <= 0 {
            return Err(SettingsError::InvalidValue(
                "jwt.refresh_token_expiry must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Password hashing settings
#[derive(serde::Deserialize, Clone)]
pub struct PasswordSettings {
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,
}

/// bcrypt's accepted work-factor range
const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

impl PasswordSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(SettingsError::InvalidValue(format!(
                "password.hash_cost must be between {} and {}",
                MIN_HASH_COST, MAX_HASH_COST
            )));
        }
        Ok(())
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            hash_cost: default_hash_cost(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_access_token_expiry() -> i64 {
    600
}

fn default_refresh_token_expiry() -> i64 {
    30 * 24 * 60 * 60
}

fn default_issuer() -> String {
    "calixio".to_string()
}

fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

/// Loads `configuration.yaml` (optional) overlaid with `APP__*` environment
/// variables, e.g. `APP__JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;

    settings
        .validate()
        .map_err(|e| ConfigError::Message(e.to_string()))?;

    Ok(settings)
}
