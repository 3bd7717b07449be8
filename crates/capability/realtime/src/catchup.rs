//! 订阅补发
//!
//! 加入房间之后的一次性补发，与加入本身分开：补发失败只意味着没有补发内容。
//! 先读缓存，缓存没有再回读持久层；回读有超时上限。

use crate::router::ResolvedSite;
use dashmap::DashMap;
use domain::{DeviceState, TelemetryUpdate};
use gms_state::DeviceStateStore;
use gms_storage::{StorageError, TelemetryLookup, TelemetryRecord};
use gms_telemetry::record_catch_up_failure;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 设备最近一次出现时携带的名称与站点。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub site: Option<ResolvedSite>,
}

/// 设备 → 名称/站点索引，由遥测分发维护。
#[derive(Default)]
pub struct DeviceIndex {
    devices: DashMap<String, DeviceInfo>,
}

impl DeviceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录设备信息；新值缺失的部分沿用旧值。
    pub fn record(&self, device_id: &str, device_name: Option<&str>, site: Option<&ResolvedSite>) {
        let mut entry = self.devices.entry(device_id.to_string()).or_default();
        if let Some(name) = device_name {
            entry.device_name = Some(name.to_string());
        }
        if let Some(site) = site {
            entry.site = Some(site.clone());
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceInfo> {
        self.devices.get(device_id).map(|entry| entry.clone())
    }

    pub fn devices_for_site(&self, site_id: &str) -> BTreeSet<String> {
        self.devices
            .iter()
            .filter(|entry| entry.site.as_ref().is_some_and(|site| site.id == site_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// 按设备名反查设备 id。
    pub fn id_for_name(&self, device_name: &str) -> Option<String> {
        self.devices
            .iter()
            .find(|entry| entry.device_name.as_deref() == Some(device_name))
            .map(|entry| entry.key().clone())
    }

    /// 只保留满足条件的设备，返回移除数量。
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.devices.len();
        self.devices.retain(|device_id, _| keep(device_id.as_str()));
        before.saturating_sub(self.devices.len())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn remove(&self, device_id: &str) {
        self.devices.remove(device_id);
    }

    pub fn clear(&self) {
        self.devices.clear();
    }
}

/// 补发数据源。
pub struct CatchUp {
    store: Arc<DeviceStateStore>,
    index: Arc<DeviceIndex>,
    lookup: Arc<dyn TelemetryLookup>,
    timeout: Duration,
}

impl CatchUp {
    pub fn new(
        store: Arc<DeviceStateStore>,
        index: Arc<DeviceIndex>,
        lookup: Arc<dyn TelemetryLookup>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            index,
            lookup,
            timeout,
        }
    }

    /// 单设备最新状态；都没有或回读失败时返回 None。
    pub async fn device_snapshot(&self, device: &str) -> Option<TelemetryUpdate> {
        if let Some(update) = self.cached(device) {
            return Some(update);
        }
        let record = self
            .bounded("find_latest_telemetry", device, self.lookup.find_latest_telemetry(device))
            .await??;
        // 回读期间可能已有实时数据写入缓存
        if let Some(update) = self.cached(device) {
            return Some(update);
        }
        Some(update_from_record(device, record))
    }

    /// 推送前的最后检查：缓存里有更新的状态时以缓存为准，站点信息保留原值。
    pub fn freshest(&self, update: TelemetryUpdate) -> TelemetryUpdate {
        match self.cached(&update.state.device_id) {
            Some(cached) if cached.state.last_updated_ms > update.state.last_updated_ms => {
                TelemetryUpdate {
                    state: cached.state,
                    device_name: cached.device_name.or(update.device_name),
                    plant_id: update.plant_id.or(cached.plant_id),
                    plant_name: update.plant_name.or(cached.plant_name),
                }
            }
            _ => update,
        }
    }

    fn cached(&self, device: &str) -> Option<TelemetryUpdate> {
        let state = self.store.get(device)?;
        let info = self.index.get(device).unwrap_or_default();
        Some(TelemetryUpdate {
            state,
            device_name: info.device_name,
            plant_id: info.site.as_ref().map(|site| site.id.clone()),
            plant_name: info.site.map(|site| site.name),
        })
    }

    /// 站点下所有已知设备的最新状态。
    ///
    /// 设备集合为缓存索引与持久层设备列表的并集，按设备 id 排序。
    /// 持久层给出的是设备名，能在索引里反查到 id 的按 id 去重。
    pub async fn site_snapshots(&self, site: &ResolvedSite) -> Vec<TelemetryUpdate> {
        // 缓存已过期的设备不再留在索引里
        let pruned = self.index.retain(|device| self.store.get(device).is_some());
        if pruned > 0 {
            debug!(target: "gms.realtime", pruned = pruned, "device_index_pruned");
        }

        let mut devices = self.index.devices_for_site(&site.id);
        if let Some(stored) = self
            .bounded(
                "list_devices_for_site",
                &site.name,
                self.lookup.list_devices_for_site(&site.name),
            )
            .await
        {
            devices.extend(
                stored
                    .into_iter()
                    .map(|name| self.index.id_for_name(&name).unwrap_or(name)),
            );
        }

        let mut updates = Vec::with_capacity(devices.len());
        for device in devices {
            if let Some(mut update) = self.device_snapshot(&device).await {
                update.plant_id = Some(site.id.clone());
                update.plant_name = Some(site.name.clone());
                updates.push(update);
            }
        }
        updates
    }

    /// 带超时的回读；失败与超时都记为补发失败并返回 None。
    async fn bounded<T, F>(&self, operation: &'static str, key: &str, future: F) -> Option<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                record_catch_up_failure();
                warn!(
                    target: "gms.realtime",
                    operation = operation,
                    key = %key,
                    error = %err,
                    "catch_up_upstream_unavailable"
                );
                None
            }
            Err(_) => {
                record_catch_up_failure();
                warn!(
                    target: "gms.realtime",
                    operation = operation,
                    key = %key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "catch_up_timed_out"
                );
                None
            }
        }
    }
}

/// 历史记录按全量快照处理：所有字段时间戳取记录时间。
fn update_from_record(device: &str, record: TelemetryRecord) -> TelemetryUpdate {
    let field_timestamps = record
        .fields
        .keys()
        .map(|name| (name.clone(), record.ts_ms))
        .collect();
    TelemetryUpdate {
        state: DeviceState {
            device_id: device.to_string(),
            fields: record.fields,
            last_updated_ms: record.ts_ms,
            field_timestamps,
            is_partial: false,
        },
        device_name: record.device_name,
        plant_id: None,
        plant_name: record.plant_name,
    }
}
