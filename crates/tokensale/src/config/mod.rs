use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Duration, Utc};

use crate::sale::SaleConfig;

const DEVELOPMENT_TOKEN_SECRET: &str = "tokensale-development-secret";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub sale: SaleConfig,
    pub tokens: TokenConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let sale = SaleConfig {
            start_time: optional_timestamp("APP_SALE_START_TIME")?,
            end_time: optional_timestamp("APP_SALE_END_TIME")?,
            accept_applicants: flag("APP_SALE_ACCEPT_APPLICANTS", true)?,
        };

        let secret = match env::var("APP_TOKEN_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingTokenSecret)
            }
            _ => DEVELOPMENT_TOKEN_SECRET.to_string(),
        };
        let tokens = TokenConfig {
            secret,
            temporary_ttl_secs: seconds("APP_TEMPORARY_TOKEN_TTL_SECS", 3600)?,
            session_ttl_secs: seconds("APP_SESSION_TOKEN_TTL_SECS", 30 * 24 * 3600)?,
        };

        let public_url =
            env::var("APP_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            sale,
            tokens,
            mail: MailConfig { public_url },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Signing secret and token lifetimes.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub temporary_ttl_secs: i64,
    pub session_ttl_secs: i64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("temporary_ttl_secs", &self.temporary_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

/// Settings used when composing outbound email.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub public_url: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimestamp { variable: &'static str, value: String },
    InvalidFlag { variable: &'static str, value: String },
    InvalidDuration { variable: &'static str, value: String },
    MissingTokenSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimestamp { variable, value } => write!(
                f,
                "{variable} must be an RFC 3339 or RFC 2822 timestamp (got '{value}')"
            ),
            ConfigError::InvalidFlag { variable, value } => {
                write!(f, "{variable} must be true or false (got '{value}')")
            }
            ConfigError::InvalidDuration { variable, value } => {
                write!(f, "{variable} must be a positive number of seconds (got '{value}')")
            }
            ConfigError::MissingTokenSecret => {
                write!(f, "APP_TOKEN_SECRET is required in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

fn optional_timestamp(variable: &'static str) -> Result<Option<DateTime<Utc>>, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => parse_timestamp(&raw)
            .map(Some)
            .ok_or(ConfigError::InvalidTimestamp {
                variable,
                value: raw,
            }),
        _ => Ok(None),
    }
}

/// Accepts RFC 3339 (`2025-01-01T00:00:00Z`) and the RFC 2822 form produced by
/// `Date.toUTCString()` (`Wed, 01 Jan 2025 00:00:00 GMT`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn flag(variable: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(variable) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            variable,
            value: raw,
        }),
    }
}

/// Positive lifetimes only, and short enough that `now + ttl` stays a representable timestamp.
fn seconds(variable: &'static str, default: i64) -> Result<i64, ConfigError> {
    let Ok(raw) = env::var(variable) else {
        return Ok(default);
    };
    let representable = |value: i64| {
        Duration::try_seconds(value)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .is_some()
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 && representable(value) => Ok(value),
        _ => Err(ConfigError::InvalidDuration {
            variable,
            value: raw,
        }),
    }
}
