use std::time::Duration;

use crate::{AppError, AppResult};

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE_URL: &str = "sqlite://marketchat.db";

/// Settings for the client-side messaging engine.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_owned(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            api_base_url: var_or("MARKETCHAT_API_URL", DEFAULT_API_URL),
            poll_interval: millis_var("MARKETCHAT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            request_timeout: millis_var("MARKETCHAT_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
        })
    }
}

/// Settings for the messaging API dev server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
}

impl ServerConfig {
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            bind_addr: var_or("MARKETCHAT_BIND", DEFAULT_BIND),
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

fn millis_var(key: &str, default: u64) -> AppResult<Duration> {
    let Ok(raw) = dotenv::var(key) else {
        return Ok(Duration::from_millis(default));
    };

    let millis: u64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key} must be a number of milliseconds, got {raw:?}")))?;
    if millis == 0 {
        return Err(AppError::Config(format!("{key} must be greater than zero")));
    }

    Ok(Duration::from_millis(millis))
}
