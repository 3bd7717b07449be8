pub mod data;
pub mod room;

pub use data::{
    AlarmEvent, AlarmNotification, DeviceState, FieldValue, TelemetryEvent, TelemetryUpdate,
    DEFAULT_SEVERITY, DEFAULT_STATUS, UNKNOWN_DEVICE, UNKNOWN_PLANT,
};
pub use room::{PushEvent, RoomId};

/// 当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
