//! 回读记录

use domain::FieldValue;
use std::collections::BTreeMap;

/// 持久层中某设备最近一条遥测。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub plant_name: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub ts_ms: i64,
}

impl TelemetryRecord {
    /// 记录是否属于该设备（id 或设备名匹配）。
    pub fn matches(&self, device: &str) -> bool {
        self.device_id.as_deref() == Some(device) || self.device_name.as_deref() == Some(device)
    }
}
