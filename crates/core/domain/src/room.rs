use std::fmt;

/// 推送房间标识。
///
/// - `Device`：`device:{deviceId}`
/// - `Site`：`plant:{siteId}`
/// - `All`：所有连接（全局通知）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoomId {
    Device(String),
    Site(String),
    All,
}

impl RoomId {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self::Device(device_id.into())
    }

    pub fn site(site_id: impl Into<String>) -> Self {
        Self::Site(site_id.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device:{}", id),
            Self::Site(id) => write!(f, "plant:{}", id),
            Self::All => write!(f, "*"),
        }
    }
}

/// 推送给连接的事件名。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEvent {
    Telemetry,
    Alarm,
    AlarmNotification,
}

impl PushEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Alarm => "alarm",
            Self::AlarmNotification => "alarm_notification",
        }
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
