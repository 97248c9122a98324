use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_REGISTRATION_OTP_TTL_SECS: u64 = 10 * 60;
const DEFAULT_DELIVERY_OTP_TTL_SECS: u64 = 15 * 60;
const DEFAULT_PASSWORD_RESET_OTP_TTL_SECS: u64 = 15 * 60;
const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: u64 = 30 * 60;
const DEFAULT_DELIVERY_RADIUS_KM: f64 = 5.0;
const DEV_DEFAULT_JWT_SECRET: &str =
    "quickcommerce_development_secret_key_do_not_use_outside_local_machines";

/// Runtime settings, deserialized from the layered sources in [`load_config`]
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[validate(range(min = 60, max = 86400))]
    pub jwt_expiration: usize,

    /// Refresh token lifetime in seconds
    #[validate(range(min = 3600, max = 2592000))]
    pub refresh_token_expiration: usize,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for the notification worker
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Registration OTP validity window (seconds)
    #[serde(default = "default_registration_otp_ttl_secs")]
    #[validate(range(min = 60))]
    pub registration_otp_ttl_secs: u64,

    /// Delivery proof OTP validity window (seconds)
    #[serde(default = "default_delivery_otp_ttl_secs")]
    #[validate(range(min = 60))]
    pub delivery_otp_ttl_secs: u64,

    /// Password reset OTP validity window (seconds)
    #[serde(default = "default_password_reset_otp_ttl_secs")]
    #[validate(range(min = 60))]
    pub password_reset_otp_ttl_secs: u64,

    /// Password reset token validity window (seconds)
    #[serde(default = "default_password_reset_token_ttl_secs")]
    #[validate(range(min = 60))]
    pub password_reset_token_ttl_secs: u64,

    /// Radius recorded on new deliveries when the request omits one
    #[serde(default = "default_delivery_radius_km")]
    #[validate(custom = "validate_delivery_radius")]
    pub default_delivery_radius_km: f64,

    /// JWT issuer name
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// JWT audience
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Admin account created at startup when both are set
    #[serde(default)]
    pub bootstrap_admin_phone: Option<String>,
    #[serde(default)]
    pub bootstrap_admin_password: Option<String>,
}

impl AppConfig {
    /// Creates a new configuration with defaults for every optional setting
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        refresh_token_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            refresh_token_expiration,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            registration_otp_ttl_secs: default_registration_otp_ttl_secs(),
            delivery_otp_ttl_secs: default_delivery_otp_ttl_secs(),
            password_reset_otp_ttl_secs: default_password_reset_otp_ttl_secs(),
            password_reset_token_ttl_secs: default_password_reset_token_ttl_secs(),
            default_delivery_radius_km: default_delivery_radius_km(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            bootstrap_admin_phone: None,
            bootstrap_admin_password: None,
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Any-origin CORS is only acceptable locally or when asked for
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// OTP validity windows, one per purpose
    pub fn otp_windows(&self) -> OtpWindows {
        OtpWindows {
            registration: Duration::from_secs(self.registration_otp_ttl_secs),
            delivery: Duration::from_secs(self.delivery_otp_ttl_secs),
            password_reset: Duration::from_secs(self.password_reset_otp_ttl_secs),
            password_reset_token: Duration::from_secs(self.password_reset_token_ttl_secs),
        }
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development.".into(),
            );
            errors.add("jwt_secret", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Per-purpose OTP and reset-token lifetimes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OtpWindows {
    pub registration: Duration,
    pub delivery: Duration,
    pub password_reset: Duration,
    pub password_reset_token: Duration,
}

impl Default for OtpWindows {
    fn default() -> Self {
        Self {
            registration: Duration::from_secs(DEFAULT_REGISTRATION_OTP_TTL_SECS),
            delivery: Duration::from_secs(DEFAULT_DELIVERY_OTP_TTL_SECS),
            password_reset: Duration::from_secs(DEFAULT_PASSWORD_RESET_OTP_TTL_SECS),
            password_reset_token: Duration::from_secs(DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_registration_otp_ttl_secs() -> u64 {
    DEFAULT_REGISTRATION_OTP_TTL_SECS
}

fn default_delivery_otp_ttl_secs() -> u64 {
    DEFAULT_DELIVERY_OTP_TTL_SECS
}

fn default_password_reset_otp_ttl_secs() -> u64 {
    DEFAULT_PASSWORD_RESET_OTP_TTL_SECS
}

fn default_password_reset_token_ttl_secs() -> u64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

fn default_delivery_radius_km() -> f64 {
    DEFAULT_DELIVERY_RADIUS_KM
}

fn default_auth_issuer() -> String {
    "quickcommerce-auth".to_string()
}

fn default_auth_audience() -> String {
    "quickcommerce-api".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

fn validate_delivery_radius(radius: f64) -> Result<(), ValidationError> {
    if !radius.is_finite() || radius <= 0.0 {
        let mut err = ValidationError::new("default_delivery_radius_km");
        err.message = Some("default_delivery_radius_km must be a positive number".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("quickcommerce_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://quickcommerce.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("refresh_token_expiration", 604800)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // jwt_secret has no default and must come from a file or APP__JWT_SECRET
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "a_sufficiently_long_and_varied_secret_for_tests_0123456789".into(),
            3600,
            86_400,
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_keep_otp_windows_separate_per_purpose() {
        let windows = base_config().otp_windows();
        assert_eq!(windows.registration, Duration::from_secs(600));
        assert_eq!(windows.delivery, Duration::from_secs(900));
        assert_eq!(windows.password_reset, Duration::from_secs(900));
        assert_eq!(windows.password_reset_token, Duration::from_secs(1800));
        assert_eq!(windows, OtpWindows::default());
    }

    #[test]
    fn base_config_passes_field_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn repeated_character_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "x".repeat(64);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn otp_window_below_one_minute_is_rejected() {
        let mut cfg = base_config();
        cfg.delivery_otp_ttl_secs = 10;
        assert!(cfg.validate().is_err());
    }

    #[rstest::rstest]
    #[case(0.0)]
    #[case(-2.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn delivery_radius_must_be_positive_and_finite(#[case] radius: f64) {
        let mut cfg = base_config();
        cfg.default_delivery_radius_km = radius;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("default_delivery_radius_km"));
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn dev_secret_rejected_outside_development() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.jwt_secret = DEV_DEFAULT_JWT_SECRET.into();
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }
}
