//! 实时推送网关
//!
//! 连接状态机：`Connected -> (join/leave)* -> Disconnected`。
//!
//! 每个连接一条有界发送队列，推送使用 `try_send`：队列满或对端已断开时
//! 只丢弃该连接的这一条消息，不影响同一房间内的其它连接。
//! 房间成员关系由读写锁保护；计算投递集合时持读锁，实际发送在锁外进行。

use async_trait::async_trait;
use domain::{PushEvent, RoomId};
use gms_telemetry::{record_connection_closed, record_connection_opened, record_pushes};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

pub type ConnectionId = u64;

/// 网关错误。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    #[error("invalid subscription: {0}")]
    InvalidSubscription(&'static str),
    #[error("serialize error: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

/// 一条待推送消息，序列化一次后在所有接收连接间共享。
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub event: PushEvent,
    frame: Arc<str>,
}

impl PushMessage {
    pub fn new<T: Serialize>(event: PushEvent, data: &T) -> Result<Self, GatewayError> {
        let frame = serde_json::to_string(&Frame {
            event: event.as_str(),
            data,
        })?;
        Ok(Self {
            event,
            frame: Arc::from(frame),
        })
    }

    /// `{"event": ..., "data": ...}` 文本帧。
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// 解析出 data 部分。
    pub fn data(&self) -> serde_json::Value {
        serde_json::from_str::<serde_json::Value>(&self.frame)
            .map(|mut value| value["data"].take())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// 一次广播的投递结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn merge(self, other: DeliveryReport) -> Self {
        Self {
            delivered: self.delivered + other.delivered,
            dropped: self.dropped + other.dropped,
        }
    }
}

/// 推送接口：按房间、按全体、按单连接。
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn emit_to_room(&self, room: &RoomId, message: PushMessage) -> DeliveryReport;

    /// 多房间投递，同一连接只收到一次。
    async fn emit_to_rooms(
        &self,
        rooms: &BTreeSet<RoomId>,
        message: PushMessage,
    ) -> DeliveryReport;

    async fn emit_to_all(&self, message: PushMessage) -> DeliveryReport;

    async fn emit_to_connection(&self, id: ConnectionId, message: PushMessage) -> DeliveryReport;
}

struct ConnectionEntry {
    tx: mpsc::Sender<PushMessage>,
    rooms: BTreeSet<RoomId>,
}

#[derive(Default)]
struct Membership {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, BTreeSet<ConnectionId>>,
}

impl Membership {
    fn remove_from_room(&mut self, id: ConnectionId, room: &RoomId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// 连接与房间管理。
pub struct RealtimeGateway {
    membership: RwLock<Membership>,
    next_id: AtomicU64,
    buffer: usize,
}

impl RealtimeGateway {
    pub fn new(buffer: usize) -> Self {
        Self {
            membership: RwLock::new(Membership::default()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// 注册新连接，返回连接 id 与推送接收端。
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<PushMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut membership = self.membership.write().await;
        membership.connections.insert(
            id,
            ConnectionEntry {
                tx,
                rooms: BTreeSet::new(),
            },
        );
        let total = membership.connections.len();
        drop(membership);

        record_connection_opened();
        info!(target: "gms.realtime", connection_id = id, total = total, "connection_opened");
        (id, rx)
    }

    /// 断开连接并立即退出所有房间；返回连接此前是否存在。
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let mut membership = self.membership.write().await;
        let Some(entry) = membership.connections.remove(&id) else {
            return false;
        };
        for room in &entry.rooms {
            membership.remove_from_room(id, room);
        }
        let total = membership.connections.len();
        drop(membership);

        record_connection_closed();
        info!(
            target: "gms.realtime",
            connection_id = id,
            rooms = entry.rooms.len(),
            total = total,
            "connection_closed"
        );
        true
    }

    /// 加入房间；返回是否为新加入。`RoomId::All` 为隐式房间，不需要加入。
    pub async fn join(&self, id: ConnectionId, room: RoomId) -> Result<bool, GatewayError> {
        if room == RoomId::All {
            return Ok(false);
        }
        let mut membership = self.membership.write().await;
        let entry = membership
            .connections
            .get_mut(&id)
            .ok_or(GatewayError::UnknownConnection(id))?;
        if !entry.rooms.insert(room.clone()) {
            return Ok(false);
        }
        membership.rooms.entry(room.clone()).or_default().insert(id);
        drop(membership);

        debug!(target: "gms.realtime", connection_id = id, room = %room, "room_joined");
        Ok(true)
    }

    /// 离开房间；返回此前是否在房间内。
    pub async fn leave(&self, id: ConnectionId, room: &RoomId) -> bool {
        let mut membership = self.membership.write().await;
        let removed = membership
            .connections
            .get_mut(&id)
            .map(|entry| entry.rooms.remove(room))
            .unwrap_or(false);
        if removed {
            membership.remove_from_room(id, room);
            debug!(target: "gms.realtime", connection_id = id, room = %room, "room_left");
        }
        removed
    }

    pub async fn rooms_of(&self, id: ConnectionId) -> Option<BTreeSet<RoomId>> {
        let membership = self.membership.read().await;
        membership
            .connections
            .get(&id)
            .map(|entry| entry.rooms.clone())
    }

    pub async fn connection_count(&self) -> usize {
        self.membership.read().await.connections.len()
    }

    /// 房间 → 成员数。
    pub async fn room_counts(&self) -> BTreeMap<String, usize> {
        let membership = self.membership.read().await;
        membership
            .rooms
            .iter()
            .map(|(room, members)| (room.to_string(), members.len()))
            .collect()
    }

    /// 计算投递集合（去重），持读锁期间只复制发送端。
    async fn recipients(&self, rooms: &BTreeSet<RoomId>) -> Vec<mpsc::Sender<PushMessage>> {
        let membership = self.membership.read().await;
        if rooms.contains(&RoomId::All) {
            return membership
                .connections
                .values()
                .map(|entry| entry.tx.clone())
                .collect();
        }
        let ids: BTreeSet<ConnectionId> = rooms
            .iter()
            .filter_map(|room| membership.rooms.get(room))
            .flatten()
            .copied()
            .collect();
        ids.iter()
            .filter_map(|id| membership.connections.get(id))
            .map(|entry| entry.tx.clone())
            .collect()
    }

    fn deliver(recipients: &[mpsc::Sender<PushMessage>], message: &PushMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for tx in recipients {
            match tx.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.dropped += 1,
            }
        }
        record_pushes(report.delivered as u64, report.dropped as u64);
        if report.dropped > 0 {
            debug!(
                target: "gms.realtime",
                event = %message.event,
                delivered = report.delivered,
                dropped = report.dropped,
                "push_dropped"
            );
        }
        report
    }
}

impl Default for RealtimeGateway {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl PushSink for RealtimeGateway {
    async fn emit_to_room(&self, room: &RoomId, message: PushMessage) -> DeliveryReport {
        let rooms = BTreeSet::from([room.clone()]);
        self.emit_to_rooms(&rooms, message).await
    }

    async fn emit_to_rooms(
        &self,
        rooms: &BTreeSet<RoomId>,
        message: PushMessage,
    ) -> DeliveryReport {
        let recipients = self.recipients(rooms).await;
        Self::deliver(&recipients, &message)
    }

    async fn emit_to_all(&self, message: PushMessage) -> DeliveryReport {
        self.emit_to_room(&RoomId::All, message).await
    }

    async fn emit_to_connection(&self, id: ConnectionId, message: PushMessage) -> DeliveryReport {
        let recipient = {
            let membership = self.membership.read().await;
            membership.connections.get(&id).map(|entry| entry.tx.clone())
        };
        match recipient {
            Some(tx) => Self::deliver(&[tx], &message),
            None => DeliveryReport {
                delivered: 0,
                dropped: 1,
            },
        }
    }
}
