//! Typed application settings.
//!
//! [`Settings`] is loaded exactly once at process start from the environment
//! (optionally hydrated from a `.env` file) and shared read-only afterwards.
//!
//! Every field has a default. Enum-like fields never fail the boot: an
//! unrecognised `ENVIRONMENT` becomes `development` and an unrecognised
//! `LOG_LEVEL` becomes `INFO`. Each substitution is kept as a
//! [`ConfigFallback`] so it can be reported once logging is up.
//!
//! # Example
//!
//! ```
//! use evermediavault_service_shared::{Environment, Settings};
//!
//! let settings = Settings::from_lookup(|key| match key {
//!     "ENVIRONMENT" => Some("Production".to_string()),
//!     "PORT" => Some("9000".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(settings.environment, Environment::Production);
//! assert_eq!(settings.port, 9000);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Setting this variable (to any value) disables `.env` hydration.
pub const SKIP_DOTENV_VAR: &str = "EVERMEDIAVAULT_SKIP_DOTENV";

/// Deployment environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Testing,
}

impl Environment {
    /// Wire name of the environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }

    /// Parse an environment name, case-insensitively.
    ///
    /// Unknown names are reported as a fallback to [`Environment::Development`].
    pub fn parse(raw: &str) -> Result<Self, ConfigFallback> {
        match raw.trim().to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            "testing" => Ok(Environment::Testing),
            _ => Err(ConfigFallback::new(
                "ENVIRONMENT",
                raw,
                Environment::Development.as_str(),
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application log level, spelled the way operators configure it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Upper-case name as accepted in `LOG_LEVEL`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// `tracing` filter directive for this level.
    ///
    /// `tracing` has no level above `error`, so `CRITICAL` maps onto it.
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }

    /// Parse a level name, case-insensitively.
    ///
    /// Unknown names are reported as a fallback to [`LogLevel::Info`].
    pub fn parse(raw: &str) -> Result<Self, ConfigFallback> {
        match raw.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(ConfigFallback::new("LOG_LEVEL", raw, LogLevel::Info.as_str())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured value that was replaced by its default instead of failing
/// the boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFallback {
    /// Variable name, e.g. `ENVIRONMENT`.
    pub key: &'static str,
    /// The rejected raw value.
    pub value: String,
    /// The value used instead.
    pub fallback: &'static str,
}

impl ConfigFallback {
    fn new(key: &'static str, value: &str, fallback: &'static str) -> Self {
        Self {
            key,
            value: value.to_string(),
            fallback,
        }
    }
}

impl fmt::Display for ConfigFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognised {} value `{}`, using `{}`",
            self.key, self.value, self.fallback
        )
    }
}

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric, boolean or list variable was present but malformed.
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The `.env` file exists but could not be read or parsed.
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

/// Immutable snapshot of the application configuration.
///
/// Construct it with [`Settings::load`] (process environment) or
/// [`Settings::from_lookup`] (any key/value source). Share it behind an
/// `Arc`; nothing mutates it after construction.
#[derive(Clone, Serialize)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub app_description: String,
    pub debug: bool,
    pub environment: Environment,

    pub api_v1_prefix: String,
    pub api_docs_url: Option<String>,
    pub api_redoc_url: Option<String>,

    pub host: String,
    pub port: u16,
    /// Upper bound for a whole request, in seconds.
    pub request_timeout_seconds: u64,

    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    #[serde(skip_serializing)]
    pub db_password: String,
    pub db_name: String,
    pub db_charset: String,
    pub db_pool_size: u32,
    pub db_max_overflow: u32,
    /// Connection recycle interval, in seconds.
    pub db_pool_recycle: u64,
    pub db_echo: bool,
    pub db_connect_timeout_seconds: u64,
    pub db_probe_timeout_seconds: u64,

    #[serde(skip_serializing)]
    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: u64,

    pub cors_origins: Vec<String>,
    pub cors_credentials: bool,
    pub cors_methods: Vec<String>,
    pub cors_headers: Vec<String>,

    pub log_level: LogLevel,
    pub log_format: String,

    pub metrics_enabled: bool,
    pub metrics_path: String,

    #[serde(skip)]
    fallbacks: Vec<ConfigFallback>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Evermediavault API".to_string(),
            app_version: "0.1.0".to_string(),
            app_description: "Evermediavault HTTP API service".to_string(),
            debug: false,
            environment: Environment::Development,
            api_v1_prefix: "/api/v1".to_string(),
            api_docs_url: Some("/docs".to_string()),
            api_redoc_url: Some("/redoc".to_string()),
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_seconds: 30,
            db_host: "localhost".to_string(),
            db_port: 3306,
            db_user: "root".to_string(),
            db_password: String::new(),
            db_name: "evermediavault".to_string(),
            db_charset: "utf8mb4".to_string(),
            db_pool_size: 10,
            db_max_overflow: 20,
            db_pool_recycle: 3600,
            db_echo: false,
            db_connect_timeout_seconds: 10,
            db_probe_timeout_seconds: 5,
            secret_key: "your-secret-key-change-in-production".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            cors_credentials: true,
            cors_methods: vec!["*".to_string()],
            cors_headers: vec!["*".to_string()],
            log_level: LogLevel::Info,
            log_format: "json".to_string(),
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            fallbacks: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// A `.env` file in the working directory is read first when present;
    /// variables already set in the environment take precedence over it.
    pub fn load() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };
        let d = Self::default();
        let mut fallbacks = Vec::new();

        let environment = match src.get("ENVIRONMENT") {
            Some(raw) => Environment::parse(&raw).unwrap_or_else(|fallback| {
                fallbacks.push(fallback);
                Environment::Development
            }),
            None => d.environment,
        };

        let log_level = match src.get("LOG_LEVEL") {
            Some(raw) => LogLevel::parse(&raw).unwrap_or_else(|fallback| {
                fallbacks.push(fallback);
                LogLevel::Info
            }),
            None => d.log_level,
        };

        Ok(Self {
            app_name: src.string("APP_NAME", d.app_name),
            app_version: src.string("APP_VERSION", d.app_version),
            app_description: src.string("APP_DESCRIPTION", d.app_description),
            debug: src.boolean("DEBUG", d.debug)?,
            environment,
            api_v1_prefix: src.string("API_V1_PREFIX", d.api_v1_prefix),
            api_docs_url: src.optional("API_DOCS_URL", d.api_docs_url),
            api_redoc_url: src.optional("API_REDOC_URL", d.api_redoc_url),
            host: src.string("HOST", d.host),
            port: src.number("PORT", d.port)?,
            request_timeout_seconds: src
                .seconds("REQUEST_TIMEOUT_SECONDS", d.request_timeout_seconds)?,
            db_host: src.string("DB_HOST", d.db_host),
            db_port: src.number("DB_PORT", d.db_port)?,
            db_user: src.string("DB_USER", d.db_user),
            db_password: src.raw_string("DB_PASSWORD", d.db_password),
            db_name: src.string("DB_NAME", d.db_name),
            db_charset: src.string("DB_CHARSET", d.db_charset),
            db_pool_size: src.number("DB_POOL_SIZE", d.db_pool_size)?,
            db_max_overflow: src.number("DB_MAX_OVERFLOW", d.db_max_overflow)?,
            db_pool_recycle: src.number("DB_POOL_RECYCLE", d.db_pool_recycle)?,
            db_echo: src.boolean("DB_ECHO", d.db_echo)?,
            db_connect_timeout_seconds: src
                .number("DB_CONNECT_TIMEOUT_SECONDS", d.db_connect_timeout_seconds)?,
            db_probe_timeout_seconds: src
                .seconds("DB_PROBE_TIMEOUT_SECONDS", d.db_probe_timeout_seconds)?,
            secret_key: src.raw_string("SECRET_KEY", d.secret_key),
            algorithm: src.string("ALGORITHM", d.algorithm),
            access_token_expire_minutes: src
                .number("ACCESS_TOKEN_EXPIRE_MINUTES", d.access_token_expire_minutes)?,
            cors_origins: src.list("CORS_ORIGINS", d.cors_origins)?,
            cors_credentials: src.boolean("CORS_CREDENTIALS", d.cors_credentials)?,
            cors_methods: src.list("CORS_METHODS", d.cors_methods)?,
            cors_headers: src.list("CORS_HEADERS", d.cors_headers)?,
            log_level,
            log_format: src.string("LOG_FORMAT", d.log_format),
            metrics_enabled: src.boolean("METRICS_ENABLED", d.metrics_enabled)?,
            metrics_path: src.string("METRICS_PATH", d.metrics_path),
            fallbacks,
        })
    }

    /// Values that were replaced by defaults during loading.
    pub fn fallbacks(&self) -> &[ConfigFallback] {
        &self.fallbacks
    }

    /// Emit one warning per substituted value.
    ///
    /// Call after logging is configured.
    pub fn log_fallbacks(&self) {
        for fallback in &self.fallbacks {
            tracing::warn!(
                key = fallback.key,
                value = %fallback.value,
                fallback = fallback.fallback,
                "configuration value not recognised, using default"
            );
        }
    }

    /// Connection URL for the relational database.
    ///
    /// Credentials are percent-encoded.
    pub fn database_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}?charset={}",
            urlencoding::encode(&self.db_user),
            urlencoding::encode(&self.db_password),
            self.db_host,
            self.db_port,
            self.db_name,
            self.db_charset
        )
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_staging(&self) -> bool {
        self.environment == Environment::Staging
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn is_testing(&self) -> bool {
        self.environment == Environment::Testing
    }

    /// `host:port` pair the server listens on.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// API prefix with a leading slash and no trailing slash.
    ///
    /// Returns `None` when the prefix is empty or `/`, meaning the API routes
    /// are mounted at the root.
    pub fn api_prefix(&self) -> Option<String> {
        let trimmed = self.api_v1_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(format!("/{}", trimmed))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn db_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.db_probe_timeout_seconds)
    }

    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.db_connect_timeout_seconds)
    }

    pub fn db_pool_recycle(&self) -> Duration {
        Duration::from_secs(self.db_pool_recycle)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("app_name", &self.app_name)
            .field("app_version", &self.app_version)
            .field("debug", &self.debug)
            .field("environment", &self.environment)
            .field("api_v1_prefix", &self.api_v1_prefix)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("db_pool_size", &self.db_pool_size)
            .field("db_max_overflow", &self.db_max_overflow)
            .field("secret_key", &"<redacted>")
            .field("cors_origins", &self.cors_origins)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

/// Read `.env` into the process environment unless disabled.
///
/// A missing file is not an error.
pub(crate) fn hydrate_env_file() -> Result<(), ConfigError> {
    if std::env::var_os(SKIP_DOTENV_VAR).is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).unwrap_or(default)
    }

    /// Untrimmed value; an explicitly empty string is kept (secrets).
    fn raw_string(&self, key: &str, default: String) -> String {
        (self.lookup)(key).unwrap_or(default)
    }

    /// Set-but-empty clears the value.
    fn optional(&self, key: &str, default: Option<String>) -> Option<String> {
        match (self.lookup)(key) {
            Some(_) => self.get(key),
            None => default,
        }
    }

    fn number<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// A whole number of seconds; zero is rejected.
    fn seconds(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.number(key, default)? {
            0 => Err(ConfigError::InvalidValue {
                key,
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            }),
            seconds => Ok(seconds),
        }
    }

    fn boolean(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: "expected a boolean".to_string(),
            }),
            None => Ok(default),
        }
    }

    fn list(&self, key: &'static str, default: Vec<String>) -> Result<Vec<String>, ConfigError> {
        match self.get(key) {
            Some(raw) => parse_list(&raw).map_err(|reason| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason,
            }),
            None => Ok(default),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "off" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// Accepts a JSON array of strings or a comma-separated list.
fn parse_list(raw: &str) -> Result<Vec<String>, String> {
    if raw.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(raw).map_err(|e| e.to_string());
    }

    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect())
}
