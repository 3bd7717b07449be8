//! 部分更新合并
//!
//! 传感器只上报变化的或固件支持的字段，下游需要每台设备一份完整状态。
//!
//! - 全量替换：字段集合即本次负载的传感器字段，所有字段时间戳统一为本次时间
//! - 部分更新：在缓存状态上覆盖非空字段，仅刷新这些字段的时间戳

use crate::store::DeviceStateStore;
use domain::{DeviceState, FieldValue, TelemetryEvent, now_epoch_ms};
use gms_telemetry::{record_merge, record_merge_rejected};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 字段负载；值为 None 表示本周期未上报。
pub type Payload = BTreeMap<String, Option<FieldValue>>;

/// 合并错误。
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

/// 身份/元数据字段只用于路由，不进入 `fields`。
pub fn is_metadata_field(name: &str) -> bool {
    name.starts_with('_')
        || matches!(name, "deviceId" | "DeviceId" | "deviceName" | "DeviceName")
}

/// 状态合并器。
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<DeviceStateStore>,
}

impl Reconciler {
    pub fn new(store: Arc<DeviceStateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DeviceStateStore> {
        &self.store
    }

    /// 合并规范化后的遥测事件。
    pub fn merge_event(&self, event: &TelemetryEvent) -> Result<DeviceState, ReconcileError> {
        let device_id = event.device_key().unwrap_or_default();
        self.merge(device_id, &event.fields, event.is_partial, event.ts_ms)
    }

    /// 将负载合并进设备状态，写回缓存后返回新状态。
    ///
    /// `ts_ms` 缺省时使用当前时间。设备 id 为空或负载没有任何非空传感器字段时
    /// 返回 `InvalidInput`，缓存保持不变。
    pub fn merge(
        &self,
        device_id: &str,
        payload: &Payload,
        is_partial: bool,
        ts_ms: Option<i64>,
    ) -> Result<DeviceState, ReconcileError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            record_merge_rejected();
            warn!(target: "gms.state", "merge_rejected_missing_device");
            return Err(ReconcileError::InvalidInput("missing device id"));
        }
        if reported_fields(payload).next().is_none() {
            record_merge_rejected();
            warn!(target: "gms.state", device_id = %device_id, "merge_rejected_empty_payload");
            return Err(ReconcileError::InvalidInput("empty payload"));
        }

        let ts_ms = ts_ms.filter(|ts| *ts > 0).unwrap_or_else(now_epoch_ms);
        let state = self.store.update(device_id, |previous| {
            if is_partial {
                apply_partial(device_id, previous, payload, ts_ms)
            } else {
                apply_full(device_id, payload, ts_ms)
            }
        });

        record_merge();
        debug!(
            target: "gms.state",
            device_id = %device_id,
            partial = is_partial,
            ts_ms = ts_ms,
            updated = %reported_fields(payload).collect::<Vec<_>>().join(","),
            "device_state_merged"
        );
        Ok(state)
    }
}

fn reported_fields(payload: &Payload) -> impl Iterator<Item = &str> + '_ {
    payload
        .iter()
        .filter(|(name, value)| value.is_some() && !is_metadata_field(name))
        .map(|(name, _)| name.as_str())
}

fn apply_full(device_id: &str, payload: &Payload, ts_ms: i64) -> DeviceState {
    let mut state = DeviceState::empty(device_id);
    write_reported(&mut state, payload, ts_ms);
    state.last_updated_ms = ts_ms;
    state.is_partial = false;
    state
}

fn apply_partial(
    device_id: &str,
    previous: Option<&DeviceState>,
    payload: &Payload,
    ts_ms: i64,
) -> DeviceState {
    let mut state = previous
        .cloned()
        .unwrap_or_else(|| DeviceState::empty(device_id));
    write_reported(&mut state, payload, ts_ms);
    // 乱序到达的旧时间戳不回拨 last_updated，保证其不早于任一字段时间戳
    state.last_updated_ms = state.last_updated_ms.max(ts_ms);
    state.is_partial = true;
    state
}

/// 写入本次上报的非空传感器字段及其时间戳。
fn write_reported(state: &mut DeviceState, payload: &Payload, ts_ms: i64) {
    for (name, value) in payload {
        let Some(value) = value else { continue };
        if is_metadata_field(name) {
            continue;
        }
        state.fields.insert(name.clone(), value.clone());
        state.field_timestamps.insert(name.clone(), ts_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_fields_are_recognised() {
        assert!(is_metadata_field("deviceId"));
        assert!(is_metadata_field("DeviceName"));
        assert!(is_metadata_field("_id"));
        assert!(!is_metadata_field("temperature"));
        assert!(!is_metadata_field("device"));
    }

    #[test]
    fn partial_keeps_last_updated_monotonic() {
        let mut previous = DeviceState::empty("esp32_04");
        previous
            .fields
            .insert("temperature".to_string(), FieldValue::I64(42));
        previous.field_timestamps.insert("temperature".to_string(), 200);
        previous.last_updated_ms = 200;

        let mut payload = Payload::new();
        payload.insert("humidity".to_string(), Some(FieldValue::I64(80)));
        let state = apply_partial("esp32_04", Some(&previous), &payload, 100);

        assert_eq!(state.last_updated_ms, 200);
        assert_eq!(state.field_timestamps["humidity"], 100);
        assert!(
            state
                .field_timestamps
                .values()
                .all(|ts| *ts <= state.last_updated_ms)
        );
    }
}
