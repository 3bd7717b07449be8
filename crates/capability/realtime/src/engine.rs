//! 引擎上下文
//!
//! 进程启动时构造一次，持有状态缓存（及其清扫任务）、合并器、路由器、
//! 网关与分发器，通过 `Arc` 传给各调用方，不使用全局单例。

use crate::catchup::{CatchUp, DeviceIndex};
use crate::dispatch::Dispatcher;
use crate::gateway::{ConnectionId, GatewayError, PushMessage, PushSink, RealtimeGateway};
use crate::router::{MarkerSitePolicy, SiteDirectory, SitePolicy, SubscriptionRouter};
use domain::{PushEvent, RoomId, TelemetryUpdate};
use gms_state::{DeviceStateStore, Reconciler, StateStoreConfig};
use gms_storage::TelemetryLookup;
use gms_telemetry::record_catch_up_pushes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 引擎参数。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub store: StateStoreConfig,
    pub notification_delay: Duration,
    pub catch_up_timeout: Duration,
    pub connection_buffer: usize,
    pub sites: Vec<(String, String)>,
    pub site_markers: Vec<(String, String)>,
    pub default_site: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StateStoreConfig::default(),
            notification_delay: Duration::from_millis(200),
            catch_up_timeout: Duration::from_secs(2),
            connection_buffer: 64,
            sites: SiteDirectory::default().sites().to_vec(),
            site_markers: vec![("esp32_04".to_string(), "Plant D".to_string())],
            default_site: Some("Plant C".to_string()),
        }
    }
}

/// 订阅结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribed {
    pub room: RoomId,
    /// 本次是否新加入（重复订阅为 false，但仍会补发）。
    pub joined: bool,
    pub caught_up: usize,
}

/// 实时引擎。
pub struct RealtimeEngine {
    store: Arc<DeviceStateStore>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    router: Arc<SubscriptionRouter>,
    gateway: Arc<RealtimeGateway>,
    index: Arc<DeviceIndex>,
    catch_up: CatchUp,
    dispatcher: Dispatcher,
}

impl RealtimeEngine {
    /// 构造引擎并启动缓存清扫任务（需在 tokio 运行时内调用）。
    pub fn new(config: EngineConfig, lookup: Arc<dyn TelemetryLookup>) -> Self {
        let policy = Arc::new(MarkerSitePolicy::new(
            config.site_markers.clone(),
            config.default_site.clone(),
        ));
        Self::with_site_policy(config, lookup, policy)
    }

    pub fn with_site_policy(
        config: EngineConfig,
        lookup: Arc<dyn TelemetryLookup>,
        policy: Arc<dyn SitePolicy>,
    ) -> Self {
        let store = Arc::new(DeviceStateStore::with_config(config.store.clone()));
        let sweeper = store.spawn_sweeper();
        let reconciler = Reconciler::new(Arc::clone(&store));
        let router = Arc::new(SubscriptionRouter::new(
            SiteDirectory::new(config.sites.clone()),
            policy,
        ));
        let gateway = Arc::new(RealtimeGateway::new(config.connection_buffer));
        let index = Arc::new(DeviceIndex::new());
        let catch_up = CatchUp::new(
            Arc::clone(&store),
            Arc::clone(&index),
            lookup,
            config.catch_up_timeout,
        );
        let sink: Arc<dyn PushSink> = gateway.clone();
        let dispatcher = Dispatcher::new(
            reconciler,
            Arc::clone(&router),
            sink,
            Arc::clone(&index),
            config.notification_delay,
        );
        info!(
            target: "gms.realtime",
            ttl_seconds = config.store.ttl.as_secs(),
            sweep_interval_seconds = config.store.sweep_interval.as_secs(),
            notification_delay_ms = config.notification_delay.as_millis() as u64,
            sites = config.sites.len(),
            "realtime_engine_started"
        );
        Self {
            store,
            sweeper: Mutex::new(Some(sweeper)),
            router,
            gateway,
            index,
            catch_up,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<DeviceStateStore> {
        &self.store
    }

    pub fn router(&self) -> &SubscriptionRouter {
        &self.router
    }

    pub fn gateway(&self) -> &Arc<RealtimeGateway> {
        &self.gateway
    }

    pub fn index(&self) -> &Arc<DeviceIndex> {
        &self.index
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<PushMessage>) {
        self.gateway.connect().await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        self.gateway.disconnect(id).await
    }

    /// 加入设备房间，然后补发该设备最新状态。
    pub async fn subscribe(
        &self,
        id: ConnectionId,
        device_id: &str,
    ) -> Result<Subscribed, GatewayError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(GatewayError::InvalidSubscription("missing deviceId"));
        }
        let room = RoomId::device(device_id);
        let joined = self.gateway.join(id, room.clone()).await?;
        let updates = self
            .catch_up
            .device_snapshot(device_id)
            .await
            .into_iter()
            .collect::<Vec<_>>();
        let caught_up = self.push_catch_up(id, &room, updates).await;
        Ok(Subscribed {
            room,
            joined,
            caught_up,
        })
    }

    /// 加入站点房间（接受站点 id 或站点名），然后补发站点下所有已知设备。
    pub async fn subscribe_plant(
        &self,
        id: ConnectionId,
        plant: &str,
    ) -> Result<Subscribed, GatewayError> {
        let site = self.router.directory().resolve(plant);
        if site.id.is_empty() {
            return Err(GatewayError::InvalidSubscription("missing plantId"));
        }
        let room = site.room();
        let joined = self.gateway.join(id, room.clone()).await?;
        let updates = self.catch_up.site_snapshots(&site).await;
        let caught_up = self.push_catch_up(id, &room, updates).await;
        Ok(Subscribed {
            room,
            joined,
            caught_up,
        })
    }

    pub async fn unsubscribe(&self, id: ConnectionId, device_id: &str) -> bool {
        self.gateway
            .leave(id, &RoomId::device(device_id.trim()))
            .await
    }

    pub async fn unsubscribe_plant(&self, id: ConnectionId, plant: &str) -> bool {
        let site = self.router.directory().resolve(plant);
        self.gateway.leave(id, &site.room()).await
    }

    /// 管理操作：删除单个设备状态。
    pub fn delete_state(&self, device_id: &str) -> bool {
        self.index.remove(device_id);
        self.store.delete(device_id)
    }

    /// 管理操作：清空全部设备状态，返回清除数量。
    pub fn clear_state(&self) -> usize {
        self.index.clear();
        let removed = self.store.clear();
        info!(target: "gms.realtime", removed = removed, "device_state_cleared");
        removed
    }

    /// 停止清扫任务。
    pub fn shutdown(&self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
                info!(target: "gms.realtime", "realtime_engine_stopped");
            }
        }
    }

    async fn push_catch_up(
        &self,
        id: ConnectionId,
        room: &RoomId,
        updates: Vec<TelemetryUpdate>,
    ) -> usize {
        let mut pushed = 0;
        for update in updates {
            let update = self.catch_up.freshest(update);
            let message = match PushMessage::new(PushEvent::Telemetry, &update) {
                Ok(message) => message,
                Err(err) => {
                    warn!(target: "gms.realtime", error = %err, "catch_up_serialize_failed");
                    continue;
                }
            };
            pushed += self.gateway.emit_to_connection(id, message).await.delivered;
        }
        record_catch_up_pushes(pushed as u64);
        info!(
            target: "gms.realtime",
            connection_id = id,
            room = %room,
            pushed = pushed,
            "catch_up_pushed"
        );
        pushed
    }
}

impl Drop for RealtimeEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
