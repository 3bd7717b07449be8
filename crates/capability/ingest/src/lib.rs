//! 消息总线适配
//!
//! 入站：订阅 `telemetry` / `alarms` 两个逻辑通道，交给 `BusMessageHandler`。
//! 出站：按通道发布规范化后的 JSON，供其它消费者使用（发出即忘）。
//!
//! 传输层可选 Redis pub/sub 或 MQTT，两者对上层暴露同样的接口。

pub mod mqtt_bus;
pub mod redis_bus;
pub mod worker;

pub use mqtt_bus::{MqttBusConfig, MqttBusSource, MqttPublisher};
pub use redis_bus::{RedisBusSource, RedisPublisher};
pub use worker::{ChannelRouter, spawn_channel_workers};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

/// 逻辑通道。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusChannel {
    Telemetry,
    Alarms,
}

impl BusChannel {
    pub const ALL: [BusChannel; 2] = [BusChannel::Telemetry, BusChannel::Alarms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Alarms => "alarms",
        }
    }

    pub fn parse(value: &str) -> Result<Self, IngestError> {
        match value.trim() {
            "telemetry" => Ok(Self::Telemetry),
            "alarms" => Ok(Self::Alarms),
            other => Err(IngestError::UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for BusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 从总线收到的一条原始消息。
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: BusChannel,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

impl BusMessage {
    pub fn new(channel: BusChannel, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            payload: payload.into(),
            received_at_ms: domain::now_epoch_ms(),
        }
    }
}

/// 总线消息处理器。
#[async_trait]
pub trait BusMessageHandler: Send + Sync {
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError>;
}

/// 采集源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn BusMessageHandler>) -> Result<(), IngestError>;
}

/// 占位源（总线关闭或测试时使用）：立即返回。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl Source for NoopSource {
    async fn run(&self, _handler: Arc<dyn BusMessageHandler>) -> Result<(), IngestError> {
        Ok(())
    }
}

/// 出站发布抽象。
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 发布到通道，返回传输层报告的投递数（无法得知时为 0）。
    async fn publish(
        &self,
        channel: BusChannel,
        payload: &serde_json::Value,
    ) -> Result<u64, IngestError>;
}

/// 占位发布器：丢弃消息。
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(
        &self,
        channel: BusChannel,
        _payload: &serde_json::Value,
    ) -> Result<u64, IngestError> {
        tracing::debug!(target: "gms.ingest", channel = %channel, "bus_publish_skipped");
        Ok(0)
    }
}

/// 进程内回环发布器：不经过外部总线，直接交给本进程的入站处理器。
///
/// 总线关闭时使用，HTTP 发布的事件仍会进入合并与推送。
pub struct LoopbackPublisher {
    handler: Arc<dyn BusMessageHandler>,
}

impl LoopbackPublisher {
    pub fn new(handler: Arc<dyn BusMessageHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Publisher for LoopbackPublisher {
    async fn publish(
        &self,
        channel: BusChannel,
        payload: &serde_json::Value,
    ) -> Result<u64, IngestError> {
        let message = BusMessage::new(channel, payload.to_string());
        self.handler.handle(message).await?;
        Ok(1)
    }
}
