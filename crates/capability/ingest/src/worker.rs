//! 按通道串行处理
//!
//! 每个通道一条有界队列、一个处理任务：同一通道内按到达顺序处理，
//! 两个通道之间互不阻塞。

use crate::{BusChannel, BusMessage, BusMessageHandler, IngestError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// 按通道把消息投递到对应队列。
#[derive(Clone)]
pub struct ChannelRouter {
    telemetry: mpsc::Sender<BusMessage>,
    alarms: mpsc::Sender<BusMessage>,
}

impl ChannelRouter {
    fn sender(&self, channel: BusChannel) -> &mpsc::Sender<BusMessage> {
        match channel {
            BusChannel::Telemetry => &self.telemetry,
            BusChannel::Alarms => &self.alarms,
        }
    }
}

#[async_trait]
impl BusMessageHandler for ChannelRouter {
    /// 队列满时等待（对上游形成背压），不丢消息。
    async fn handle(&self, message: BusMessage) -> Result<(), IngestError> {
        let channel = message.channel;
        self.sender(channel)
            .send(message)
            .await
            .map_err(|_| IngestError::Handler(format!("{} worker stopped", channel)))
    }
}

/// 启动两个通道的处理任务。
///
/// 返回的 `ChannelRouter` 全部释放后，队列关闭，处理任务在排空后退出。
pub fn spawn_channel_workers(
    handler: Arc<dyn BusMessageHandler>,
    capacity: usize,
) -> (ChannelRouter, Vec<JoinHandle<()>>) {
    let capacity = capacity.max(1);
    let (telemetry_tx, telemetry_rx) = mpsc::channel(capacity);
    let (alarms_tx, alarms_rx) = mpsc::channel(capacity);
    let handles = vec![
        spawn_worker(BusChannel::Telemetry, telemetry_rx, Arc::clone(&handler)),
        spawn_worker(BusChannel::Alarms, alarms_rx, handler),
    ];
    (
        ChannelRouter {
            telemetry: telemetry_tx,
            alarms: alarms_tx,
        },
        handles,
    )
}

fn spawn_worker(
    channel: BusChannel,
    mut rx: mpsc::Receiver<BusMessage>,
    handler: Arc<dyn BusMessageHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(err) = handler.handle(message).await {
                warn!(
                    target: "gms.ingest",
                    channel = %channel,
                    error = %err,
                    "bus_message_failed"
                );
            }
        }
    })
}
