//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 消息总线类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Redis,
    Mqtt,
    Off,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub bus: BusKind,
    pub redis_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub database_url: Option<String>,
    pub state_ttl_seconds: u64,
    pub state_sweep_interval_seconds: u64,
    pub notification_delay_ms: u64,
    pub catch_up_timeout_ms: u64,
    pub connection_buffer: usize,
    pub channel_queue_size: usize,
    /// 站点 id → 站点名，例如 `1=Plant C`。
    pub sites: Vec<(String, String)>,
    /// 设备名标记 → 站点名，例如 `esp32_04=Plant D`。
    pub site_markers: Vec<(String, String)>,
    pub default_site: String,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env::var("GMS_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bus = read_bus_kind("GMS_BUS")?;
        let redis_url =
            env::var("GMS_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let mqtt_host = env::var("GMS_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("GMS_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("GMS_MQTT_USERNAME");
        let mqtt_password = read_optional("GMS_MQTT_PASSWORD");
        let mqtt_topic_prefix =
            env::var("GMS_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "gms".to_string());
        let database_url = read_optional("GMS_DATABASE_URL");
        let state_ttl_seconds = read_u64_with_default("GMS_STATE_TTL_SECONDS", 3600)?;
        let state_sweep_interval_seconds =
            read_u64_with_default("GMS_STATE_SWEEP_INTERVAL_SECONDS", 600)?;
        let notification_delay_ms = read_u64_with_default("GMS_NOTIFICATION_DELAY_MS", 200)?;
        let catch_up_timeout_ms = read_u64_with_default("GMS_CATCH_UP_TIMEOUT_MS", 2000)?;
        let connection_buffer = read_u64_with_default("GMS_CONNECTION_BUFFER", 64)?.max(1) as usize;
        let channel_queue_size =
            read_u64_with_default("GMS_CHANNEL_QUEUE_SIZE", 1024)?.max(1) as usize;
        let sites = read_pairs_with_default("GMS_SITES", "1=Plant C,2=Plant D")?;
        let site_markers = read_pairs_with_default("GMS_SITE_MARKERS", "esp32_04=Plant D")?;
        let default_site = env::var("GMS_DEFAULT_SITE").unwrap_or_else(|_| "Plant C".to_string());

        Ok(Self {
            http_addr,
            bus,
            redis_url,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            database_url,
            state_ttl_seconds,
            state_sweep_interval_seconds,
            notification_delay_ms,
            catch_up_timeout_ms,
            connection_buffer,
            channel_queue_size,
            sites,
            site_markers,
            default_site,
        })
    }
}

fn read_bus_kind(key: &str) -> Result<BusKind, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(BusKind::Off),
    };
    match value.to_ascii_lowercase().as_str() {
        "redis" => Ok(BusKind::Redis),
        "mqtt" => Ok(BusKind::Mqtt),
        "" | "off" | "none" => Ok(BusKind::Off),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
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

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_pairs_with_default(key: &str, default: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_pairs(&value).ok_or_else(|| ConfigError::Invalid(key.to_string(), value))
}

/// 解析 `k1=v1,k2=v2` 形式的映射表；空串得到空表。
fn parse_pairs(value: &str) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (key, val) = item.split_once('=')?;
        let (key, val) = (key.trim(), val.trim());
        if key.is_empty() || val.is_empty() {
            return None;
        }
        pairs.push((key.to_string(), val.to_string()));
    }
    Some(pairs)
}
