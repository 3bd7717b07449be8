//! Redis pub/sub 传输

use crate::{BusChannel, BusMessage, BusMessageHandler, IngestError, Publisher, Source};
use async_trait::async_trait;
use futures_util::StreamExt;
use gms_telemetry::record_bus_message;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Redis 订阅源：订阅 `telemetry` 与 `alarms` 两个频道。
pub struct RedisBusSource {
    client: redis::Client,
}

impl RedisBusSource {
    pub fn connect(redis_url: &str) -> Result<Self, IngestError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| IngestError::Source(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Source for RedisBusSource {
    async fn run(&self, handler: Arc<dyn BusMessageHandler>) -> Result<(), IngestError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|err| IngestError::Source(err.to_string()))?;
        for channel in BusChannel::ALL {
            pubsub
                .subscribe(channel.as_str())
                .await
                .map_err(|err| IngestError::Source(err.to_string()))?;
        }
        info!(target: "gms.ingest", transport = "redis", "bus_subscribed");

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let channel = match BusChannel::parse(msg.get_channel_name()) {
                Ok(channel) => channel,
                Err(err) => {
                    warn!(target: "gms.ingest", error = %err, "bus_message_skipped");
                    continue;
                }
            };
            record_bus_message();
            let message = BusMessage::new(channel, msg.get_payload_bytes());
            debug!(
                target: "gms.ingest",
                channel = %channel,
                payload_size = message.payload.len(),
                "bus_message_received"
            );
            if let Err(err) = handler.handle(message).await {
                warn!(target: "gms.ingest", error = %err, "bus_message_dispatch_failed");
            }
        }
        Err(IngestError::Source("redis subscription closed".to_string()))
    }
}

/// Redis 发布器。
#[derive(Clone)]
pub struct RedisPublisher {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str) -> Result<Self, IngestError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| IngestError::Publish(err.to_string()))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| IngestError::Publish(err.to_string()))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(
        &self,
        channel: BusChannel,
        payload: &serde_json::Value,
    ) -> Result<u64, IngestError> {
        let body = payload.to_string();
        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(channel.as_str(), body)
            .await
            .map_err(|err| IngestError::Publish(err.to_string()))?;
        debug!(
            target: "gms.ingest",
            channel = %channel,
            receivers = receivers,
            "bus_published"
        );
        Ok(receivers.max(0) as u64)
    }
}
