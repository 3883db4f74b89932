use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use ledger::Strategy;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerBackend {
    Redis,
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown ledger backend `{other}`")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub ledger_backend: LedgerBackend,
    pub redis_url: String,
    /// `None` when the identity backend is not configured.
    pub identity: Option<IdentityConfig>,
    pub site_url: String,
    pub secure_cookies: bool,
    pub auth_timeout: Duration,
    pub strategy: Strategy,
    pub notify_capacity: usize,
    pub admin_email_domain: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            ledger_backend: LedgerBackend::Redis,
            redis_url: "redis://redis:6379".to_string(),
            identity: None,
            site_url: "http://localhost:1111".to_string(),
            secure_cookies: true,
            auth_timeout: Duration::from_millis(5000),
            strategy: Strategy::Rebuild,
            notify_capacity: 256,
            admin_email_domain: "columbia.edu".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            ledger_backend: try_load("LEDGER_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://redis:6379")?,
            identity: load_identity(),
            site_url: try_load("SITE_URL", "http://localhost:1111")?,
            secure_cookies: try_load("COOKIE_SECURE", "true")?,
            auth_timeout: Duration::from_millis(try_load("AUTH_TIMEOUT_MS", "5000")?),
            strategy: try_load("RECONCILE_STRATEGY", "rebuild")?,
            notify_capacity: try_load("NOTIFY_CAPACITY", "256")?,
            admin_email_domain: try_load("ADMIN_EMAIL_DOMAIN", "columbia.edu")?,
        })
    }
}

fn load_identity() -> Option<IdentityConfig> {
    match (var("AUTH_URL").ok(), read_secret("AUTH_ANON_KEY")) {
        (Some(url), Some(anon_key)) => Some(IdentityConfig { url, anon_key }),
        _ => {
            warn!("Identity backend not configured, protected routes will redirect to login");
            None
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

/// Reads `/run/secrets/<name>`, falling back to the environment variable of the same name.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("Failed to read {secret_name} from file: {e}");
        })
        .or_else(|_| var(secret_name))
        .ok()
        .filter(|secret| !secret.is_empty())
}
