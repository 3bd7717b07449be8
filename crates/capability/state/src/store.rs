//! 设备状态缓存
//!
//! 设备 id → 对账后的完整状态，按 key 空闲过期：
//! - 每次写入重置过期倒计时
//! - 读取时惰性清理已过期条目
//! - 后台定时清扫回收过期条目
//!
//! 不做容量淘汰，条目数量由设备规模决定。

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::DeviceState;
use gms_telemetry::record_states_evicted;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// 缓存参数。
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(600),
        }
    }
}

impl StateStoreConfig {
    fn sanitized(mut self) -> Self {
        if self.ttl.is_zero() {
            self.ttl = Duration::from_secs(1);
        }
        if self.sweep_interval.is_zero() {
            self.sweep_interval = Duration::from_secs(1);
        }
        self
    }
}

struct CachedEntry {
    state: DeviceState,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// 设备状态缓存。
pub struct DeviceStateStore {
    entries: DashMap<String, CachedEntry>,
    config: StateStoreConfig,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::with_config(StateStoreConfig::default())
    }

    pub fn with_config(config: StateStoreConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &StateStoreConfig {
        &self.config
    }

    /// 读取设备状态；不存在或已过期返回 None。
    pub fn get(&self, device_id: &str) -> Option<DeviceState> {
        let now = Instant::now();
        let expired = match self.entries.get(device_id) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.state.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(device_id, |_, entry| entry.is_expired(now));
        }
        None
    }

    /// 无条件覆盖写入，并重置过期倒计时。
    pub fn put(&self, device_id: &str, state: DeviceState) {
        let expires_at = Instant::now() + self.config.ttl;
        self.entries
            .insert(device_id.to_string(), CachedEntry { state, expires_at });
    }

    /// 单 key 原子读改写。
    ///
    /// `f` 执行期间持有该 key 所在分片的写锁，同一设备的两次合并不会交错；
    /// 已过期的旧值按不存在处理。
    pub fn update<F>(&self, device_id: &str, f: F) -> DeviceState
    where
        F: FnOnce(Option<&DeviceState>) -> DeviceState,
    {
        let now = Instant::now();
        let expires_at = now + self.config.ttl;
        match self.entries.entry(device_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = if occupied.get().is_expired(now) {
                    None
                } else {
                    Some(&occupied.get().state)
                };
                let next = f(previous);
                occupied.insert(CachedEntry {
                    state: next.clone(),
                    expires_at,
                });
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                vacant.insert(CachedEntry {
                    state: next.clone(),
                    expires_at,
                });
                next
            }
        }
    }

    /// 删除设备状态，返回删除前是否存在未过期条目。
    pub fn delete(&self, device_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(device_id)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// 所有未过期的设备 id。
    pub fn keys(&self) -> BTreeSet<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// 所有未过期的设备状态。
    pub fn all(&self) -> BTreeMap<String, DeviceState> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().state.clone()))
            .collect()
    }

    /// 当前条目数（包含尚未清扫的过期条目）。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 清空全部状态（管理操作），返回清除数量。
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// 回收已过期条目，返回回收数量。
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// 启动后台清扫任务；由持有方负责在退出时 abort。
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // interval 首次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    record_states_evicted(removed as u64);
                    info!(
                        target: "gms.state",
                        removed = removed,
                        remaining = store.len(),
                        "device_state_swept"
                    );
                }
            }
        })
    }
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}
