use std::{path::PathBuf, time::Duration};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{BlogError, Result};

const DEFAULT_JWT_SECRET: &str = "your-super-secret-jwt-key";

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Directory holding the daily shard files and `index.json`
    pub notes_dir: PathBuf,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Upstream base URL for the API proxy
    pub api_base_url: String,

    /// Upstream request timeout in seconds
    pub proxy_timeout_secs: u64,

    /// HMAC secret for bearer tokens
    pub jwt_secret: String,

    /// Token lifetime, e.g. `24h`, `30m`, `7d`
    pub jwt_expiry: String,

    /// Admin login accepted by `/api/auth/login`
    pub admin_email: String,
    pub admin_password: String,

    /// Origins allowed by the CORS layer; `*` allows any
    pub cors_allowed_origins: Vec<String>,

    /// Largest request body accepted, including proxied uploads
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_dir: PathBuf::from("./data/notes"),
            bind_addr: "127.0.0.1:3000".to_string(),
            api_base_url: "http://localhost:8080/api".to_string(),
            proxy_timeout_secs: 30,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiry: "24h".to_string(),
            admin_email: "nextblog@example.com".to_string(),
            admin_password: "nextblog123".to_string(),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Builds the configuration from the environment, loading `.env` first
    /// when present. Unset variables fall back to [`Config::default`].
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_err() {
            debug!("No .env file found, using environment variables");
        }

        let defaults = Self::default();
        let config = Self {
            notes_dir: env_var("NOTES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.notes_dir),
            bind_addr: env_var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            api_base_url: env_var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            proxy_timeout_secs: parse_env("PROXY_TIMEOUT_SECS", defaults.proxy_timeout_secs)?,
            jwt_secret: env_var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_expiry: env_var("JWT_EXPIRY").unwrap_or(defaults.jwt_expiry),
            admin_email: env_var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            admin_password: env_var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_allowed_origins),
            max_body_bytes: parse_env("MAX_BODY_BYTES", defaults.max_body_bytes)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise only fail at first use.
    pub fn validate(&self) -> Result<()> {
        self.token_lifetime()?;
        if self.jwt_secret.is_empty() {
            return Err(BlogError::ConfigError {
                message: "JWT_SECRET must not be empty".to_string(),
            });
        }
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("JWT_SECRET is not set, using the built-in development secret");
        }
        Ok(())
    }

    /// Parsed `jwt_expiry`. Token claims hold `i64` seconds, which bounds
    /// the accepted lifetime.
    pub fn token_lifetime(&self) -> Result<Duration> {
        parse_duration(&self.jwt_expiry)
            .filter(|d| i64::try_from(d.as_secs()).is_ok())
            .ok_or_else(|| BlogError::ConfigError {
                message: format!("Invalid JWT_EXPIRY: {}", self.jwt_expiry),
            })
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout_secs)
    }

    /// Path of the index document inside the notes directory.
    pub fn index_path(&self) -> PathBuf {
        self.notes_dir.join("index.json")
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Some(raw) => raw.parse().map_err(|_| BlogError::ConfigError {
            message: format!("{} is not a number: {}", key, raw),
        }),
        None => Ok(default),
    }
}

/// Parses `<n><unit>` where unit is one of `s`, `m`, `h`, `d`.
/// A bare number is taken as seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()? {
        's' => (&raw[..raw.len() - 1], 1),
        'm' => (&raw[..raw.len() - 1], 60),
        'h' => (&raw[..raw.len() - 1], 3600),
        'd' => (&raw[..raw.len() - 1], 86_400),
        c if c.is_ascii_digit() => (raw, 1),
        _ => return None,
    };
    let value: u64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    Some(Duration::from_secs(value.checked_mul(multiplier)?))
}
