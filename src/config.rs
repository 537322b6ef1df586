use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub session_token: Option<String>,
    pub driver_id: Option<String>,
    pub database_path: String,
    pub http_port: u16,
    pub log_level: String,
    pub request_timeout: Duration,
    pub location_fresh_window: Duration,
    pub location_timeout: Duration,
    pub event_buffer_size: usize,
    pub offline_mode: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_base_url: env::var("API_BASE_URL")
                .map_err(|_| AppError::Internal("API_BASE_URL must be set".to_string()))?,
            session_token: optional("SESSION_TOKEN"),
            driver_id: optional("DRIVER_ID"),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "driver-matches.db".to_string()),
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            request_timeout: Duration::from_secs(parse_or_default("REQUEST_TIMEOUT_SECS", 30)?),
            location_fresh_window: Duration::from_secs(parse_or_default("LOCATION_FRESH_SECS", 5)?),
            location_timeout: Duration::from_secs(parse_or_default("LOCATION_TIMEOUT_SECS", 9)?),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offline_mode: parse_or_default("OFFLINE_MODE", false)?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
