//! 字段别名表
//!
//! 不同固件用不同的大小写/命名上报同一语义字段，入口处统一映射为规范名。

use serde_json::{Map, Value};

/// 规范名 → 可接受的来源字段名（按优先级排列）。
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<(String, Vec<String>)>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个规范名及其来源字段名；同名规范字段会被覆盖。
    pub fn with(mut self, canonical: &str, sources: &[&str]) -> Self {
        let sources = sources.iter().map(|name| name.to_string()).collect();
        match self.entries.iter_mut().find(|(name, _)| name == canonical) {
            Some(entry) => entry.1 = sources,
            None => self.entries.push((canonical.to_string(), sources)),
        }
        self
    }

    /// 遥测消息默认别名表。
    pub fn telemetry() -> Self {
        Self::new()
            .with("deviceId", &["deviceId", "DeviceId", "device", "device_id"])
            .with("deviceName", &["deviceName", "DeviceName"])
            .with("plantId", &["plantId", "PlantId"])
            .with("plantName", &["plantName", "PlantName"])
            .with("temperature", &["temperature", "Temperature"])
            .with("humidity", &["humidity", "Humidity"])
            .with("oilLevel", &["oilLevel", "OilLevel", "oil_level"])
            .with("openAlerts", &["openAlerts", "OpenAlerts"])
            .with("timestamp", &["timestamp", "Timestamp", "ts"])
            .with(
                "isPartialUpdate",
                &["isPartialUpdate", "partialUpdate", "partial"],
            )
            .with("fullSnapshot", &["fullSnapshot", "FullSnapshot"])
    }

    /// 告警消息默认别名表。
    pub fn alarm() -> Self {
        Self::new()
            .with("id", &["id", "_id", "Id"])
            .with("deviceId", &["deviceId", "DeviceId", "device", "device_id"])
            .with("deviceName", &["deviceName", "DeviceName"])
            .with("plantId", &["plantId", "PlantId"])
            .with("plantName", &["plantName", "PlantName"])
            .with("alarmCode", &["alarmCode", "AlarmCode"])
            .with(
                "description",
                &["alarmDescription", "AlarmDescription", "description"],
            )
            .with("value", &["alarmValue", "AlarmValue", "value"])
            .with("severity", &["severity", "Severity"])
            .with("status", &["status", "Status"])
            .with(
                "timestamp",
                &["createdTimestamp", "CreatedTimestamp", "timestamp", "Timestamp"],
            )
    }

    /// 按优先级取第一个非 null 的来源字段。
    pub fn lookup<'a>(&self, canonical: &str, object: &'a Map<String, Value>) -> Option<&'a Value> {
        let (_, sources) = self.entries.iter().find(|(name, _)| name == canonical)?;
        sources
            .iter()
            .filter_map(|source| object.get(source))
            .find(|value| !value.is_null())
    }

    /// 规范名是否在表中。
    pub fn contains(&self, canonical: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == canonical)
    }

    /// 来源字段名对应的规范名。
    pub fn canonical_for(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, sources)| sources.iter().any(|name| name == source))
            .map(|(name, _)| name.as_str())
    }

    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}
