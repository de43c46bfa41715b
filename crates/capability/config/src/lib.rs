//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未配置时使用内存 KV（无持久化）。
    pub redis_url: Option<String>,
    pub status_ttl_seconds: u64,
    pub summary_ttl_seconds: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_backoff_ms: u64,
    pub call_timeout_ms: u64,
    pub token_margin_seconds: u64,
    pub job_ttl_seconds: u64,
    pub simulate: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("FLEET_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let redis_url = read_optional("FLEET_REDIS_URL");
        let status_ttl_seconds = read_u64_with_default("FLEET_STATUS_TTL_SECONDS", 30)?;
        let summary_ttl_seconds = read_u64_with_default("FLEET_SUMMARY_TTL_SECONDS", 60)?;
        let retry_max_attempts = read_u32_with_default("FLEET_RETRY_MAX_ATTEMPTS", 3)?;
        if retry_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "FLEET_RETRY_MAX_ATTEMPTS".to_string(),
                "0".to_string(),
            ));
        }
        let retry_initial_backoff_ms =
            read_u64_with_default("FLEET_RETRY_INITIAL_BACKOFF_MS", 1000)?;
        let retry_multiplier = read_f64_with_default("FLEET_RETRY_MULTIPLIER", 2.0)?;
        if !(retry_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "FLEET_RETRY_MULTIPLIER".to_string(),
                retry_multiplier.to_string(),
            ));
        }
        let retry_max_backoff_ms = read_u64_with_default("FLEET_RETRY_MAX_BACKOFF_MS", 10_000)?;
        let call_timeout_ms = read_u64_with_default("FLEET_CALL_TIMEOUT_MS", 10_000)?;
        let token_margin_seconds = read_u64_with_default("FLEET_TOKEN_MARGIN_SECONDS", 60)?;
        let job_ttl_seconds = read_u64_with_default("FLEET_JOB_TTL_SECONDS", 86_400)?;
        let simulate = read_bool_with_default("FLEET_SIMULATE", false);

        Ok(Self {
            http_addr,
            redis_url,
            status_ttl_seconds,
            summary_ttl_seconds,
            retry_max_attempts,
            retry_initial_backoff_ms,
            retry_multiplier,
            retry_max_backoff_ms,
            call_timeout_ms,
            token_margin_seconds,
            job_ttl_seconds,
            simulate,
        })
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_f64_with_default(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<f64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
