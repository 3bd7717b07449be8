//! MQTT 传输
//!
//! 通道映射为 `{prefix}/telemetry` 与 `{prefix}/alarms` 两个 topic。

use crate::{BusChannel, BusMessage, BusMessageHandler, IngestError, Publisher, Source};
use async_trait::async_trait;
use gms_telemetry::record_bus_message;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// MQTT 连接配置。
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

impl MqttBusConfig {
    fn options(&self, role: &str) -> MqttOptions {
        let client_id = format!("gms-{}-{}", role, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (self.username.as_ref(), self.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }

    pub fn topic_for(&self, channel: BusChannel) -> String {
        let prefix = self.topic_prefix.trim_matches('/');
        if prefix.is_empty() {
            channel.as_str().to_string()
        } else {
            format!("{}/{}", prefix, channel.as_str())
        }
    }

    /// topic → 通道；不属于本前缀的 topic 返回 None。
    pub fn channel_for(&self, topic: &str) -> Option<BusChannel> {
        BusChannel::ALL
            .into_iter()
            .find(|channel| self.topic_for(*channel) == topic.trim_matches('/'))
    }
}

/// MQTT 订阅源。
#[derive(Debug, Clone)]
pub struct MqttBusSource {
    config: MqttBusConfig,
}

impl MqttBusSource {
    pub fn new(config: MqttBusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttBusConfig {
        &self.config
    }
}

#[async_trait]
impl Source for MqttBusSource {
    async fn run(&self, handler: Arc<dyn BusMessageHandler>) -> Result<(), IngestError> {
        let (client, mut eventloop) = AsyncClient::new(self.config.options("ingest"), 10);
        for channel in BusChannel::ALL {
            client
                .subscribe(self.config.topic_for(channel), QoS::AtMostOnce)
                .await
                .map_err(|err| IngestError::Source(err.to_string()))?;
        }
        info!(target: "gms.ingest", transport = "mqtt", "bus_subscribed");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let Some(channel) = self.config.channel_for(&publish.topic) else {
                        warn!(target: "gms.ingest", topic = %publish.topic, "bus_message_skipped");
                        continue;
                    };
                    record_bus_message();
                    let message = BusMessage::new(channel, publish.payload.to_vec());
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
                Ok(_) => {}
                Err(err) => return Err(IngestError::Source(err.to_string())),
            }
        }
    }
}

/// MQTT 发布器。
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    config: MqttBusConfig,
}

impl MqttPublisher {
    /// 建立发布连接；返回的任务驱动 eventloop，由调用方负责 abort。
    pub fn connect(config: MqttBusConfig) -> (Self, tokio::task::JoinHandle<()>) {
        let (client, mut eventloop) = AsyncClient::new(config.options("publish"), 10);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "gms.ingest", error = %err, "mqtt_publish_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        (Self { client, config }, handle)
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &self,
        channel: BusChannel,
        payload: &serde_json::Value,
    ) -> Result<u64, IngestError> {
        let topic = self.config.topic_for(channel);
        let body = payload.to_string();
        debug!(
            target: "gms.ingest",
            topic = %topic,
            payload_size = body.len(),
            "bus_published"
        );
        self.client
            .publish(topic, QoS::AtMostOnce, false, body)
            .await
            .map_err(|err| IngestError::Publish(err.to_string()))?;
        Ok(0)
    }
}
