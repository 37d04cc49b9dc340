//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and can be overridden with
//! `NEWSROOM_*` environment variables. Missing values are filled with defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token and session settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Outgoing mail
    #[serde(default)]
    pub email: EmailConfig,
    /// Public site settings
    #[serde(default)]
    pub site: SiteConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin for API clients
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/newsroom.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access, refresh and reset tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: i64,
    /// Refresh token lifetime
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_ttl_days: i64,
    /// Web session lifetime
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    /// Password reset token lifetime
    #[serde(default = "default_reset_ttl_hours")]
    pub reset_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_ttl_minutes: default_access_ttl_minutes(),
            refresh_ttl_days: default_refresh_ttl_days(),
            session_ttl_days: default_session_ttl_days(),
            reset_ttl_hours: default_reset_ttl_hours(),
        }
    }
}

/// Placeholder signing secret; `validate` refuses to run with it
pub const PLACEHOLDER_JWT_SECRET: &str = "change-me-in-production";

/// Shortest HMAC secret accepted for token signing
pub const MIN_JWT_SECRET_LEN: usize = 32;

pub const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;
pub const MAX_REFRESH_TTL_DAYS: i64 = 3650;
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;
pub const MAX_RESET_TTL_HOURS: i64 = 7 * 24;

fn default_jwt_secret() -> String {
    PLACEHOLDER_JWT_SECRET.to_string()
}

fn default_access_ttl_minutes() -> i64 {
    15
}

fn default_refresh_ttl_days() -> i64 {
    7
}

fn default_session_ttl_days() -> i64 {
    7
}

fn default_reset_ttl_hours() -> i64 {
    24
}

/// SMTP settings. When disabled, mail is written to the log instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address, e.g. `News <noreply@example.com>`
    #[serde(default = "default_from")]
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_from(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "Newsroom <noreply@localhost>".to_string()
}

/// Public site settings used in rendered pages and outgoing links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Absolute base URL for links in emails
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            base_url: default_base_url(),
        }
    }
}

fn default_site_name() -> String {
    "News Application".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the default configuration; invalid YAML
    /// is an error that carries the line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file, then apply `NEWSROOM_*` overrides and
    /// validate the result.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.auth.jwt_secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }
        if secret == PLACEHOLDER_JWT_SECRET {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret is still the placeholder; set NEWSROOM_AUTH_JWT_SECRET".to_string(),
            ));
        }
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::ValidationError(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        check_ttl("auth.access_ttl_minutes", self.auth.access_ttl_minutes, MAX_ACCESS_TTL_MINUTES)?;
        check_ttl("auth.refresh_ttl_days", self.auth.refresh_ttl_days, MAX_REFRESH_TTL_DAYS)?;
        check_ttl("auth.session_ttl_days", self.auth.session_ttl_days, MAX_SESSION_TTL_DAYS)?;
        check_ttl("auth.reset_ttl_hours", self.auth.reset_ttl_hours, MAX_RESET_TTL_HOURS)?;
        if self.email.enabled && self.email.smtp_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "email.smtp_host is required when email is enabled".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(host) = std::env::var("NEWSROOM_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("NEWSROOM_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(origin) = std::env::var("NEWSROOM_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        // Database
        if let Ok(driver) = std::env::var("NEWSROOM_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("NEWSROOM_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth
        if let Ok(secret) = std::env::var("NEWSROOM_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(minutes) = env_parse::<i64>("NEWSROOM_AUTH_ACCESS_TTL_MINUTES") {
            self.auth.access_ttl_minutes = minutes;
        }
        if let Some(days) = env_parse::<i64>("NEWSROOM_AUTH_REFRESH_TTL_DAYS") {
            self.auth.refresh_ttl_days = days;
        }

        // Email
        if let Some(enabled) = env_parse::<bool>("NEWSROOM_EMAIL_ENABLED") {
            self.email.enabled = enabled;
        }
        if let Ok(host) = std::env::var("NEWSROOM_EMAIL_SMTP_HOST") {
            self.email.smtp_host = host;
        }
        if let Some(port) = env_parse::<u16>("NEWSROOM_EMAIL_SMTP_PORT") {
            self.email.smtp_port = port;
        }
        if let Ok(username) = std::env::var("NEWSROOM_EMAIL_USERNAME") {
            self.email.username = username;
        }
        if let Ok(password) = std::env::var("NEWSROOM_EMAIL_PASSWORD") {
            self.email.password = password;
        }
        if let Ok(from) = std::env::var("NEWSROOM_EMAIL_FROM") {
            self.email.from = from;
        }

        // Site
        if let Ok(name) = std::env::var("NEWSROOM_SITE_NAME") {
            self.site.name = name;
        }
        if let Ok(base_url) = std::env::var("NEWSROOM_SITE_BASE_URL") {
            self.site.base_url = base_url;
        }
    }
}

/// Parse an environment variable, ignoring it when unset or malformed
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn check_ttl(name: &str, value: i64, max: i64) -> Result<(), ConfigError> {
    if value <= 0 || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between 1 and {}",
            name, max
        )));
    }
    Ok(())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "NEWSROOM_SERVER_HOST",
    "NEWSROOM_SERVER_PORT",
    "NEWSROOM_SERVER_CORS_ORIGIN",
    "NEWSROOM_DATABASE_DRIVER",
    "NEWSROOM_DATABASE_URL",
    "NEWSROOM_AUTH_JWT_SECRET",
    "NEWSROOM_AUTH_ACCESS_TTL_MINUTES",
    "NEWSROOM_AUTH_REFRESH_TTL_DAYS",
    "NEWSROOM_EMAIL_ENABLED",
    "NEWSROOM_EMAIL_SMTP_HOST",
    "NEWSROOM_EMAIL_SMTP_PORT",
    "NEWSROOM_EMAIL_USERNAME",
    "NEWSROOM_EMAIL_PASSWORD",
    "NEWSROOM_EMAIL_FROM",
    "NEWSROOM_SITE_NAME",
    "NEWSROOM_SITE_BASE_URL",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn host_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
                .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
            Just("localhost".to_string()),
            "[a-z][a-z0-9]{0,10}",
        ]
    }

    fn config_strategy() -> impl Strategy<Value = Config> {
        (
            host_strategy(),
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z][a-z0-9_/]{0,20}\\.db",
            "[A-Za-z0-9]{8,32}",
            1i64..=120,
            1i64..=60,
        )
            .prop_map(
                |(host, port, driver, url, secret, access, refresh)| Config {
                    server: ServerConfig {
                        host,
                        port,
                        cors_origin: default_cors_origin(),
                    },
                    database: DatabaseConfig { driver, url },
                    auth: AuthConfig {
                        jwt_secret: secret,
                        access_ttl_minutes: access,
                        refresh_ttl_days: refresh,
                        ..AuthConfig::default()
                    },
                    email: EmailConfig::default(),
                    site: SiteConfig::default(),
                },
            )
    }

    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: [1, 2]".to_string()),
            Just("server:\n  port: 99999999999".to_string()),
            Just("database:\n  driver: postgres".to_string()),
            Just("auth:\n  access_ttl_minutes: soon".to_string()),
            Just("email:\n  enabled: maybe".to_string()),
            Just("server: 12345".to_string()),
            Just("site: true".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn config_roundtrip(config in config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");
            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.database.url, parsed.database.url);
            prop_assert_eq!(config.auth.jwt_secret, parsed.auth.jwt_secret);
            prop_assert_eq!(config.auth.access_ttl_minutes, parsed.auth.access_ttl_minutes);
            prop_assert_eq!(config.auth.refresh_ttl_days, parsed.auth.refresh_ttl_days);
        }

        #[test]
        fn malformed_config_is_rejected(yaml in malformed_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");
            prop_assert!(Config::load(file.path()).is_err());
        }

        #[test]
        fn env_port_takes_precedence(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = lock_env();
            clear_env();

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("Failed to write config");
            std::env::set_var("NEWSROOM_SERVER_PORT", env_port.to_string());
            std::env::set_var("NEWSROOM_AUTH_JWT_SECRET", "an-hmac-secret-long-enough-to-sign-tokens");

            let config = Config::load_with_env(file.path());
            clear_env();

            prop_assert_eq!(config.expect("config should load").server.port, env_port);
        }
    }
}
