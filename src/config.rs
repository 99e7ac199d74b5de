use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub dispatch_concurrency: usize,
    pub dispatch_retry_base_ms: u64,
    pub dispatch_retry_cap_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            dispatch_concurrency: parse_or_default("DISPATCH_CONCURRENCY", 8)?,
            dispatch_retry_base_ms: parse_or_default("DISPATCH_RETRY_BASE_MS", 250)?,
            dispatch_retry_cap_ms: parse_or_default("DISPATCH_RETRY_CAP_MS", 5_000)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
