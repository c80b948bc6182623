//! 应用运行配置加载。
//!
//! 只有这一层读进程环境；核心 crate 拿到的都是注入的普通结构体。

use domain::DecodeMode;
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
    pub decode_mode: DecodeMode,
    pub measurement: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic: String,
    pub mqtt_reconnect_initial_ms: u64,
    pub mqtt_reconnect_max_ms: u64,
    pub influx_url: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub influx_token: String,
    pub influx_timeout_ms: u64,
    pub batch_size: usize,
    pub max_buffer_size: usize,
    pub max_retries: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub flush_interval_ms: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let decode_mode_raw = read_required("BRIDGE_FORMAT")?;
        let decode_mode = decode_mode_raw
            .parse::<DecodeMode>()
            .map_err(|_| ConfigError::Invalid("BRIDGE_FORMAT".to_string(), decode_mode_raw))?;
        let measurement = read_required("BRIDGE_MEASUREMENT")?;
        let mqtt_topic = read_required("BRIDGE_MQTT_TOPIC")?;
        let influx_url = read_required("BRIDGE_INFLUX_URL")?;
        let influx_org = read_required("BRIDGE_INFLUX_ORG")?;
        let influx_bucket = read_required("BRIDGE_INFLUX_BUCKET")?;
        let influx_token = read_required("BRIDGE_INFLUX_TOKEN")?;

        let http_addr =
            env::var("BRIDGE_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let mqtt_host = env::var("BRIDGE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("BRIDGE_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("BRIDGE_MQTT_USERNAME");
        let mqtt_password = read_optional("BRIDGE_MQTT_PASSWORD");
        let mqtt_reconnect_initial_ms =
            read_u64_with_default("BRIDGE_MQTT_RECONNECT_INITIAL_MS", 1000)?;
        let mqtt_reconnect_max_ms = read_u64_with_default("BRIDGE_MQTT_RECONNECT_MAX_MS", 60_000)?;
        let influx_timeout_ms = read_u64_with_default("BRIDGE_INFLUX_TIMEOUT_MS", 10_000)?;
        let batch_size = read_usize_with_default("BRIDGE_BATCH_SIZE", 100)?;
        let max_buffer_size = read_usize_with_default("BRIDGE_MAX_BUFFER_SIZE", 1000)?;
        let max_retries = read_usize_with_default("BRIDGE_MAX_RETRIES", 3)?;
        let backoff_initial_ms = read_u64_with_default("BRIDGE_BACKOFF_INITIAL_MS", 200)?;
        let backoff_max_ms = read_u64_with_default("BRIDGE_BACKOFF_MAX_MS", 5000)?;
        let flush_interval_ms = read_u64_with_default("BRIDGE_FLUSH_INTERVAL_MS", 5000)?;

        Ok(Self {
            http_addr,
            decode_mode,
            measurement,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic,
            mqtt_reconnect_initial_ms,
            mqtt_reconnect_max_ms,
            influx_url,
            influx_org,
            influx_bucket,
            influx_token,
            influx_timeout_ms,
            batch_size,
            max_buffer_size,
            max_retries,
            backoff_initial_ms,
            backoff_max_ms,
            flush_interval_ms,
        })
    }
}

fn read_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
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

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
