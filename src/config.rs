//! Environment-variable configuration.
//!
//! One [`Config`] value is read at process start and passed by reference into
//! everything that needs it — there is no ambient global lookup. Malformed
//! values fail loudly at startup instead of being silently defaulted: an
//! integer variable set to `"10s"` is a deploy mistake, not a request to use
//! the default.

use std::env;
use std::time::Duration;

/// Minimum byte length for the cookie-signing secret.
const MIN_COOKIE_SECRET_LEN: usize = 32;

/// Deployment mode, read from `APP_ENV`.
///
/// Controls formatting-only behavior: JSON bodies are pretty-printed outside
/// production, and error responses carry diagnostic detail only outside
/// production. Unrecognized values fall back to `Development`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Development,
    Test,
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    fn from_env_value(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("production") => Self::Production,
            Some("test") => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Error raised for a missing or malformed environment variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing env variable: {0}")]
    Missing(&'static str),

    #[error("env variable {name} must be a valid integer, not {value:?}")]
    InvalidInt { name: &'static str, value: String },

    #[error("non-boolean value given for {name}: {value:?}")]
    InvalidBool { name: &'static str, value: String },

    #[error("{name} must be at least {MIN_COOKIE_SECRET_LEN} bytes when cookie sessions are enabled")]
    SecretTooShort { name: &'static str },
}

/// Server configuration, loaded once via [`Config::from_env`].
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    /// Listening port (`PORT`, default 8080).
    pub port: u16,
    /// Externally advertised base URL (`SERVER_PUBLIC_URL`).
    pub public_url: String,
    /// Deadline for a single handler invocation (`SERVER_TIMEOUT`, ms, default 10 000).
    pub request_timeout: Duration,
    /// Whether sessions require a signed `sid` cookie alongside the bearer
    /// token (`SERVER_USE_COOKIE_SESSIONS`, default false).
    pub cookie_sessions: bool,
    /// HMAC secret for cookie signing (`SERVER_COOKIE_SECRET`). Required and
    /// length-checked only when cookie sessions are enabled.
    pub cookie_secret: String,
    /// Session lifetime in the backing store (`SERVER_SESSION_TTL`, seconds,
    /// default 7 days).
    pub session_ttl: Duration,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = Mode::from_env_value(read("APP_ENV"));
        let port_raw = parse_int("PORT", read("PORT"), 8080)?;
        let port = u16::try_from(port_raw).map_err(|_| ConfigError::InvalidInt {
            name: "PORT",
            value: port_raw.to_string(),
        })?;
        let timeout_ms = parse_int("SERVER_TIMEOUT", read("SERVER_TIMEOUT"), 10_000)?;
        let ttl_secs = parse_int(
            "SERVER_SESSION_TTL",
            read("SERVER_SESSION_TTL"),
            60 * 60 * 24 * 7,
        )?;
        let cookie_sessions = parse_bool(
            "SERVER_USE_COOKIE_SESSIONS",
            read("SERVER_USE_COOKIE_SESSIONS"),
            false,
        )?;
        let cookie_secret = read("SERVER_COOKIE_SECRET").unwrap_or_default();
        let public_url =
            read("SERVER_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        let config = Self {
            mode,
            port,
            public_url,
            request_timeout: Duration::from_millis(timeout_ms),
            cookie_sessions,
            cookie_secret,
            session_ttl: Duration::from_secs(ttl_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_sessions {
            if self.cookie_secret.is_empty() {
                return Err(ConfigError::Missing("SERVER_COOKIE_SECRET"));
            }
            if self.cookie_secret.len() < MIN_COOKIE_SECRET_LEN {
                return Err(ConfigError::SecretTooShort {
                    name: "SERVER_COOKIE_SECRET",
                });
            }
        }
        Ok(())
    }
}

impl Default for Config {
    /// Development defaults, as if no environment variables were set.
    fn default() -> Self {
        Self {
            mode: Mode::Development,
            port: 8080,
            public_url: "http://localhost:8080".to_owned(),
            request_timeout: Duration::from_millis(10_000),
            cookie_sessions: false,
            cookie_secret: String::new(),
            session_ttl: Duration::from_secs(60 * 60 * 24 * 7),
        }
    }
}

fn read(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parses a decimal integer, rejecting anything that does not round-trip
/// (`"08"`, `"10s"`, `"1.5"` are all errors, never silently defaulted).
fn parse_int(name: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(parsed) if parsed.to_string() == value => Ok(parsed),
            _ => Err(ConfigError::InvalidInt { name, value }),
        },
    }
}

/// Parses exactly `"true"` or `"false"`.
fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref() {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(ConfigError::InvalidBool {
            name,
            value: other.to_owned(),
        }),
    }
}
