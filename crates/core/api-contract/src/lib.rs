//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 总线发布请求体（`POST /api/bus/publish`）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub channel: String,
    pub data: serde_json::Value,
}

/// 总线发布结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub channel: String,
    pub receivers: u64,
    /// 规范化后实际发布的负载。
    pub payload: serde_json::Value,
}

/// 状态删除结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearStateResponse {
    pub removed: usize,
}

/// 在线连接统计（`GET /api/realtime/connections`）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatsDto {
    pub connections: usize,
    pub rooms: BTreeMap<String, usize>,
}

/// 进程指标快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub bus_messages: u64,
    pub dropped_malformed: u64,
    pub merges: u64,
    pub merges_rejected: u64,
    pub alarms: u64,
    pub notifications: u64,
    pub pushes_delivered: u64,
    pub pushes_dropped: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub catch_up_pushes: u64,
    pub catch_up_failures: u64,
    pub states_evicted: u64,
    pub cached_devices: usize,
}

/// WebSocket 客户端指令。
///
/// `{"type":"subscribe","deviceId":"esp32_04"}`、`{"type":"subscribePlant","plantId":"2"}`。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        #[serde(alias = "device", deserialize_with = "string_or_number")]
        device_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SubscribePlant {
        #[serde(alias = "plant", deserialize_with = "string_or_number")]
        plant_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        #[serde(alias = "device", deserialize_with = "string_or_number")]
        device_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UnsubscribePlant {
        #[serde(alias = "plant", deserialize_with = "string_or_number")]
        plant_id: String,
    },
    Ping,
}

/// 订阅确认（服务端 `subscribed` 事件的 data）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    pub room: String,
    pub joined: bool,
    pub caught_up: usize,
}

/// 服务端发往 WebSocket 的控制帧：`{"event": ..., "data": ...}`。
#[derive(Debug, Serialize)]
pub struct ServerFrame<T> {
    pub event: &'static str,
    pub data: T,
}

impl<T: Serialize> ServerFrame<T> {
    pub fn new(event: &'static str, data: T) -> Self {
        Self { event, data }
    }
}

/// 站点/设备 id 常以数字下发，统一转成字符串。
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
