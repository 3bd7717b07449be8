use async_trait::async_trait;
use gms_ingest::{
    BusChannel, BusMessage, BusMessageHandler, IngestError, MqttBusConfig, NoopPublisher,
    Publisher, spawn_channel_workers,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<(BusChannel, String)>>,
}

#[async_trait]
impl BusMessageHandler for RecordingHandler {
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError> {
        // 遥测处理得慢一些，验证两个通道互不阻塞且各自保序
        if message.channel == BusChannel::Telemetry {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let body = String::from_utf8_lossy(&message.payload).to_string();
        if body == "boom" {
            return Err(IngestError::Handler("boom".to_string()));
        }
        self.seen
            .lock()
            .expect("lock")
            .push((message.channel, body));
        Ok(())
    }
}

#[test]
fn channel_names_parse() {
    assert_eq!(BusChannel::parse("telemetry").expect("telemetry"), BusChannel::Telemetry);
    assert_eq!(BusChannel::parse(" alarms ").expect("alarms"), BusChannel::Alarms);
    assert!(matches!(
        BusChannel::parse("alerts"),
        Err(IngestError::UnknownChannel(_))
    ));
    assert_eq!(BusChannel::Alarms.to_string(), "alarms");
}

#[test]
fn mqtt_topics_follow_prefix() {
    let config = MqttBusConfig {
        host: "127.0.0.1".to_string(),
        port: 1883,
        username: None,
        password: None,
        topic_prefix: "gms/".to_string(),
    };
    assert_eq!(config.topic_for(BusChannel::Telemetry), "gms/telemetry");
    assert_eq!(config.channel_for("gms/alarms"), Some(BusChannel::Alarms));
    assert_eq!(config.channel_for("other/alarms"), None);
}

#[tokio::test(start_paused = true)]
async fn workers_keep_per_channel_order() {
    let recorder = Arc::new(RecordingHandler::default());
    let (router, handles) = spawn_channel_workers(recorder.clone(), 4);

    for index in 0..5 {
        router
            .handle(BusMessage::new(BusChannel::Telemetry, format!("t{index}")))
            .await
            .expect("enqueue telemetry");
        router
            .handle(BusMessage::new(BusChannel::Alarms, format!("a{index}")))
            .await
            .expect("enqueue alarm");
    }
    router
        .handle(BusMessage::new(BusChannel::Alarms, "boom"))
        .await
        .expect("enqueue failing alarm");
    router
        .handle(BusMessage::new(BusChannel::Alarms, "a5"))
        .await
        .expect("enqueue alarm after failure");
    drop(router);
    for handle in handles {
        handle.await.expect("worker");
    }

    let seen = recorder.seen.lock().expect("lock").clone();
    let telemetry: Vec<_> = seen
        .iter()
        .filter(|(channel, _)| *channel == BusChannel::Telemetry)
        .map(|(_, body)| body.as_str())
        .collect();
    let alarms: Vec<_> = seen
        .iter()
        .filter(|(channel, _)| *channel == BusChannel::Alarms)
        .map(|(_, body)| body.as_str())
        .collect();
    assert_eq!(telemetry, vec!["t0", "t1", "t2", "t3", "t4"]);
    assert_eq!(alarms, vec!["a0", "a1", "a2", "a3", "a4", "a5"]);
    // 告警通道不等遥测通道
    assert_eq!(seen.first().map(|(channel, _)| *channel), Some(BusChannel::Alarms));
}

#[tokio::test]
async fn noop_publisher_accepts_everything() {
    let publisher = NoopPublisher;
    let delivered = publisher
        .publish(BusChannel::Telemetry, &serde_json::json!({ "deviceId": "esp32_01" }))
        .await
        .expect("publish");
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn loopback_publisher_feeds_local_handler() {
    let recorder = Arc::new(RecordingHandler::default());
    let publisher = gms_ingest::LoopbackPublisher::new(recorder.clone());
    let delivered = publisher
        .publish(BusChannel::Alarms, &serde_json::json!({ "deviceId": "esp32_04" }))
        .await
        .expect("publish");
    assert_eq!(delivered, 1);

    let seen = recorder.seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, BusChannel::Alarms);
    let body: serde_json::Value = serde_json::from_str(&seen[0].1).expect("json");
    assert_eq!(body["deviceId"], "esp32_04");
}
