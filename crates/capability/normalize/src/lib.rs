//! 总线消息规范化
//!
//! 原始 JSON → `TelemetryEvent` / `AlarmEvent`，在合并之前统一字段名，
//! 合并器本身不感知别名。

pub mod alias;

pub use alias::AliasTable;

use chrono::DateTime;
use domain::{AlarmEvent, FieldValue, TelemetryEvent};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// 规范化错误。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// 路由与控制字段，不作为传感器字段输出。
const CONTROL_FIELDS: [&str; 7] = [
    "deviceId",
    "deviceName",
    "plantId",
    "plantName",
    "timestamp",
    "isPartialUpdate",
    "fullSnapshot",
];

/// 别名驱动的规范化器。
#[derive(Debug, Clone)]
pub struct Normalizer {
    telemetry: AliasTable,
    alarm: AliasTable,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(AliasTable::telemetry(), AliasTable::alarm())
    }
}

impl Normalizer {
    pub fn new(telemetry: AliasTable, alarm: AliasTable) -> Self {
        Self { telemetry, alarm }
    }

    pub fn normalize_telemetry(
        &self,
        payload: &[u8],
        received_at_ms: i64,
    ) -> Result<TelemetryEvent, NormalizeError> {
        let value = parse_json(payload)?;
        self.normalize_telemetry_value(&value, received_at_ms)
    }

    /// 规范化一条遥测消息。
    ///
    /// - 已知传感器字段按别名表取第一个非 null 值
    /// - 其它未登记字段原样保留（仅标量）
    /// - null 表示本周期未上报；对象/数组直接丢弃
    /// - 缺省为部分更新，`isPartialUpdate: false` 或 `fullSnapshot: true` 为全量替换
    pub fn normalize_telemetry_value(
        &self,
        value: &Value,
        received_at_ms: i64,
    ) -> Result<TelemetryEvent, NormalizeError> {
        let object = as_object(value)?;
        let table = &self.telemetry;

        let device_id = table.lookup("deviceId", object).and_then(text);
        let device_name = table.lookup("deviceName", object).and_then(text);
        if device_id.is_none() && device_name.is_none() {
            return Err(NormalizeError::InvalidPayload(
                "missing deviceId/deviceName".to_string(),
            ));
        }

        let mut fields = BTreeMap::new();
        for canonical in table.canonical_names() {
            if CONTROL_FIELDS.contains(&canonical) {
                continue;
            }
            if let Some(value) = table.lookup(canonical, object) {
                if let Some(field) = FieldValue::from_json(value) {
                    fields.insert(canonical.to_string(), Some(field));
                }
            } else if reported_as_null(table, canonical, object) {
                fields.insert(canonical.to_string(), None);
            }
        }
        for (name, value) in object {
            if table.canonical_for(name).is_some() {
                continue;
            }
            if value.is_null() {
                fields.insert(name.clone(), None);
            } else if let Some(field) = FieldValue::from_json(value) {
                fields.insert(name.clone(), Some(field));
            }
        }

        let ts_ms = table.lookup("timestamp", object).and_then(parse_timestamp);
        let explicit_partial = table.lookup("isPartialUpdate", object).and_then(Value::as_bool);
        let full_snapshot = table
            .lookup("fullSnapshot", object)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let is_partial = !full_snapshot && explicit_partial.unwrap_or(true);

        let event = TelemetryEvent {
            device_id,
            device_name,
            plant_id: table.lookup("plantId", object).and_then(text),
            plant_name: table.lookup("plantName", object).and_then(text),
            fields,
            ts_ms,
            is_partial,
            received_at_ms,
        };
        debug!(
            target: "gms.ingest",
            device = %event.device_key().unwrap_or_default(),
            fields = event.fields.len(),
            partial = event.is_partial,
            "telemetry_normalized"
        );
        Ok(event)
    }

    pub fn normalize_alarm(
        &self,
        payload: &[u8],
        received_at_ms: i64,
    ) -> Result<AlarmEvent, NormalizeError> {
        let value = parse_json(payload)?;
        self.normalize_alarm_value(&value, received_at_ms)
    }

    /// 规范化一条告警消息；缺少时间戳时使用接收时间。
    pub fn normalize_alarm_value(
        &self,
        value: &Value,
        received_at_ms: i64,
    ) -> Result<AlarmEvent, NormalizeError> {
        let object = as_object(value)?;
        let table = &self.alarm;

        let alarm = AlarmEvent {
            id: table.lookup("id", object).and_then(text),
            device_id: table.lookup("deviceId", object).and_then(text),
            device_name: table.lookup("deviceName", object).and_then(text),
            alarm_code: table.lookup("alarmCode", object).and_then(text),
            description: table.lookup("description", object).and_then(text),
            value: table.lookup("value", object).and_then(FieldValue::from_json),
            severity: table.lookup("severity", object).and_then(text),
            status: table.lookup("status", object).and_then(text),
            ts_ms: table
                .lookup("timestamp", object)
                .and_then(parse_timestamp)
                .unwrap_or(received_at_ms),
            plant_id: table.lookup("plantId", object).and_then(text),
            plant_name: table.lookup("plantName", object).and_then(text),
        };
        if alarm.device_key().is_none() {
            return Err(NormalizeError::InvalidPayload(
                "missing deviceId/deviceName".to_string(),
            ));
        }
        Ok(alarm)
    }
}

/// 规范化后的遥测事件转回总线 JSON（字段名均为规范名）。
pub fn telemetry_to_json(event: &TelemetryEvent) -> Value {
    let mut object = Map::new();
    insert_text(&mut object, "deviceId", event.device_id.as_deref());
    insert_text(&mut object, "deviceName", event.device_name.as_deref());
    insert_text(&mut object, "plantId", event.plant_id.as_deref());
    insert_text(&mut object, "plantName", event.plant_name.as_deref());
    for (name, value) in &event.fields {
        let value = match value {
            Some(value) => serde_json::to_value(value).unwrap_or(Value::Null),
            None => Value::Null,
        };
        object.insert(name.clone(), value);
    }
    if let Some(ts_ms) = event.ts_ms {
        object.insert("timestamp".to_string(), Value::from(ts_ms));
    }
    object.insert("isPartialUpdate".to_string(), Value::Bool(event.is_partial));
    Value::Object(object)
}

/// 规范化后的告警事件转回总线 JSON。
pub fn alarm_to_json(alarm: &AlarmEvent) -> Value {
    serde_json::to_value(alarm).unwrap_or(Value::Null)
}

/// 解析时间戳：毫秒整数、数字字符串或 RFC 3339。
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    let ts_ms = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    };
    ts_ms.filter(|ts| *ts > 0)
}

fn parse_json(payload: &[u8]) -> Result<Value, NormalizeError> {
    serde_json::from_slice(payload).map_err(|err| NormalizeError::Malformed(err.to_string()))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, NormalizeError> {
    value
        .as_object()
        .ok_or_else(|| NormalizeError::Malformed("expected JSON object".to_string()))
}

/// 字符串或数字转为非空文本（站点 id 常以数字上报）。
fn text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// 来源字段存在但全部为 null。
fn reported_as_null(table: &AliasTable, canonical: &str, object: &Map<String, Value>) -> bool {
    object
        .iter()
        .any(|(name, value)| value.is_null() && table.canonical_for(name) == Some(canonical))
}

fn insert_text(object: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
}
