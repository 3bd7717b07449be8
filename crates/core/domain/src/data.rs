use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 告警通知缺省设备名。
pub const UNKNOWN_DEVICE: &str = "Unknown Device";
/// 告警通知缺省站点名。
pub const UNKNOWN_PLANT: &str = "Unknown Plant";
/// 告警通知缺省严重级别。
pub const DEFAULT_SEVERITY: &str = "Warning";
/// 告警通知缺省状态。
pub const DEFAULT_STATUS: &str = "New";

/// 传感器字段的标量值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
}

impl FieldValue {
    /// 从 JSON 值转换；null、对象与数组不是标量，返回 None。
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(v) => Some(Self::Bool(*v)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => Some(Self::I64(v)),
                None => n.as_f64().map(Self::F64),
            },
            serde_json::Value::String(v) => Some(Self::String(v.clone())),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I64(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I64(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// 设备对账后的完整状态。
///
/// `field_timestamps` 记录每个字段最近一次写入的时间（毫秒），
/// 任一字段的时间戳都不晚于 `last_updated_ms`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub device_id: String,
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(rename = "lastUpdated")]
    pub last_updated_ms: i64,
    pub field_timestamps: BTreeMap<String, i64>,
    pub is_partial: bool,
}

impl DeviceState {
    /// 尚未收到任何字段的空状态。
    pub fn empty(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            fields: BTreeMap::new(),
            last_updated_ms: 0,
            field_timestamps: BTreeMap::new(),
            is_partial: true,
        }
    }
}

/// 规范化后的遥测事件（总线消费一次即丢弃）。
///
/// `fields` 中值为 None 表示本周期未上报该字段。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub plant_id: Option<String>,
    pub plant_name: Option<String>,
    pub fields: BTreeMap<String, Option<FieldValue>>,
    pub ts_ms: Option<i64>,
    pub is_partial: bool,
    pub received_at_ms: i64,
}

impl TelemetryEvent {
    /// 设备主键：优先 deviceId，缺失时回退到 deviceName。
    pub fn device_key(&self) -> Option<&str> {
        device_key(self.device_id.as_deref(), self.device_name.as_deref())
    }
}

/// 规范化后的告警事件（不做合并，逐条推送）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub id: Option<String>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub alarm_code: Option<String>,
    pub description: Option<String>,
    pub value: Option<FieldValue>,
    pub severity: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "timestamp")]
    pub ts_ms: i64,
    pub plant_id: Option<String>,
    pub plant_name: Option<String>,
}

impl AlarmEvent {
    pub fn device_key(&self) -> Option<&str> {
        device_key(self.device_id.as_deref(), self.device_name.as_deref())
    }
}

/// 面向界面展示的告警通知（全部字段已填充缺省值）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmNotification {
    pub id: Option<String>,
    pub device_id: String,
    pub device_name: String,
    pub alarm_code: Option<String>,
    pub description: Option<String>,
    pub value: Option<FieldValue>,
    pub severity: String,
    pub status: String,
    pub plant_name: String,
    pub timestamp: i64,
}

impl AlarmNotification {
    pub fn from_alarm(alarm: &AlarmEvent) -> Self {
        let device_id = alarm.device_key().unwrap_or_default().to_string();
        Self {
            id: alarm.id.clone(),
            device_id,
            device_name: non_empty(alarm.device_name.as_deref())
                .unwrap_or(UNKNOWN_DEVICE)
                .to_string(),
            alarm_code: alarm.alarm_code.clone(),
            description: alarm.description.clone(),
            value: alarm.value.clone(),
            severity: non_empty(alarm.severity.as_deref())
                .unwrap_or(DEFAULT_SEVERITY)
                .to_string(),
            status: non_empty(alarm.status.as_deref())
                .unwrap_or(DEFAULT_STATUS)
                .to_string(),
            plant_name: non_empty(alarm.plant_name.as_deref())
                .unwrap_or(UNKNOWN_PLANT)
                .to_string(),
            timestamp: alarm.ts_ms,
        }
    }
}

/// 推送给 `telemetry` 事件订阅者的负载。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryUpdate {
    #[serde(flatten)]
    pub state: DeviceState,
    pub device_name: Option<String>,
    pub plant_id: Option<String>,
    pub plant_name: Option<String>,
}

fn device_key<'a>(device_id: Option<&'a str>, device_name: Option<&'a str>) -> Option<&'a str> {
    non_empty(device_id).or_else(|| non_empty(device_name))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
