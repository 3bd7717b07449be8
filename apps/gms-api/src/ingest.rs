//! 总线接入装配
//!
//! 总线消息 → 按通道串行队列 → 规范化 → 实时引擎（合并并推送）。
//! 出站发布器与入站源使用同一种传输；总线关闭时发布走进程内回环。

use async_trait::async_trait;
use gms_config::{AppConfig, BusKind};
use gms_ingest::{
    BusChannel, BusMessage, BusMessageHandler, IngestError, LoopbackPublisher, MqttBusConfig,
    MqttBusSource, MqttPublisher, NoopSource, Publisher, RedisBusSource, RedisPublisher, Source,
    spawn_channel_workers,
};
use gms_normalize::Normalizer;
use gms_realtime::RealtimeEngine;
use gms_telemetry::record_dropped_malformed;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 源异常退出后的重连间隔。
const SOURCE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 规范化并交给实时引擎。
pub struct BusHandler {
    normalizer: Arc<Normalizer>,
    engine: Arc<RealtimeEngine>,
}

impl BusHandler {
    pub fn new(normalizer: Arc<Normalizer>, engine: Arc<RealtimeEngine>) -> Self {
        Self { normalizer, engine }
    }

    async fn handle_telemetry(&self, message: &BusMessage) {
        let event = match self
            .normalizer
            .normalize_telemetry(&message.payload, message.received_at_ms)
        {
            Ok(event) => event,
            Err(err) => {
                record_dropped_malformed();
                warn!(
                    target: "gms.ingest",
                    channel = %message.channel,
                    payload_size = message.payload.len(),
                    error = %err,
                    "telemetry_dropped"
                );
                return;
            }
        };
        match self.engine.dispatcher().handle_telemetry(&event).await {
            Ok(report) => debug!(
                target: "gms.ingest",
                device = %event.device_key().unwrap_or_default(),
                partial = event.is_partial,
                delivered = report.delivered,
                "telemetry_handled"
            ),
            Err(err) => warn!(
                target: "gms.ingest",
                device = %event.device_key().unwrap_or_default(),
                error = %err,
                "telemetry_dispatch_failed"
            ),
        }
    }

    async fn handle_alarm(&self, message: &BusMessage) {
        let alarm = match self
            .normalizer
            .normalize_alarm(&message.payload, message.received_at_ms)
        {
            Ok(alarm) => alarm,
            Err(err) => {
                record_dropped_malformed();
                warn!(
                    target: "gms.ingest",
                    channel = %message.channel,
                    payload_size = message.payload.len(),
                    error = %err,
                    "alarm_dropped"
                );
                return;
            }
        };
        // 延迟通知任务独立运行，不阻塞本通道后续消息
        if let Err(err) = self.engine.dispatcher().handle_alarm(alarm).await {
            warn!(target: "gms.ingest", error = %err, "alarm_dispatch_failed");
        }
    }
}

#[async_trait]
impl BusMessageHandler for BusHandler {
    /// 单条消息的失败只记录日志，不中断通道。
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError> {
        match message.channel {
            BusChannel::Telemetry => self.handle_telemetry(&message).await,
            BusChannel::Alarms => self.handle_alarm(&message).await,
        }
        Ok(())
    }
}

/// 运行中的总线接入。
pub struct IngestRuntime {
    pub publisher: Arc<dyn Publisher>,
    tasks: Vec<JoinHandle<()>>,
}

impl IngestRuntime {
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(target: "gms.ingest", tasks = self.tasks.len(), "ingest_stopped");
    }
}

fn mqtt_config(config: &AppConfig) -> MqttBusConfig {
    MqttBusConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_prefix: config.mqtt_topic_prefix.clone(),
    }
}

/// 启动总线接入：通道处理任务、入站源与出站发布器。
pub async fn spawn_ingest(
    config: &AppConfig,
    engine: Arc<RealtimeEngine>,
    normalizer: Arc<Normalizer>,
) -> Result<IngestRuntime, IngestError> {
    let handler = Arc::new(BusHandler::new(normalizer, engine));
    let (router, mut tasks) = spawn_channel_workers(handler, config.channel_queue_size);
    let router: Arc<dyn BusMessageHandler> = Arc::new(router);

    let (source, publisher): (Arc<dyn Source>, Arc<dyn Publisher>) = match config.bus {
        BusKind::Redis => {
            info!(target: "gms.ingest", "bus_redis");
            let source: Arc<dyn Source> = Arc::new(RedisBusSource::connect(&config.redis_url)?);
            let publisher: Arc<dyn Publisher> =
                Arc::new(RedisPublisher::connect(&config.redis_url).await?);
            (source, publisher)
        }
        BusKind::Mqtt => {
            let mqtt = mqtt_config(config);
            info!(
                target: "gms.ingest",
                host = %mqtt.host,
                port = mqtt.port,
                prefix = %mqtt.topic_prefix,
                "bus_mqtt"
            );
            let (publisher, eventloop) = MqttPublisher::connect(mqtt.clone());
            tasks.push(eventloop);
            let source: Arc<dyn Source> = Arc::new(MqttBusSource::new(mqtt));
            let publisher: Arc<dyn Publisher> = Arc::new(publisher);
            (source, publisher)
        }
        BusKind::Off => {
            info!(target: "gms.ingest", "bus_off_loopback");
            let source: Arc<dyn Source> = Arc::new(NoopSource);
            let publisher: Arc<dyn Publisher> =
                Arc::new(LoopbackPublisher::new(Arc::clone(&router)));
            (source, publisher)
        }
    };

    tasks.push(tokio::spawn(run_source(source, router)));
    Ok(IngestRuntime { publisher, tasks })
}

/// 运行入站源；异常退出后间隔重连，正常结束则退出。
async fn run_source(source: Arc<dyn Source>, router: Arc<dyn BusMessageHandler>) {
    loop {
        match source.run(Arc::clone(&router)).await {
            Ok(()) => {
                debug!(target: "gms.ingest", "bus_source_finished");
                return;
            }
            Err(err) => {
                warn!(
                    target: "gms.ingest",
                    error = %err,
                    retry_in_ms = SOURCE_RETRY_DELAY.as_millis() as u64,
                    "bus_source_failed"
                );
                tokio::time::sleep(SOURCE_RETRY_DELAY).await;
            }
        }
    }
}
