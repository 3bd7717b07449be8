//! 追踪、请求 ID 与进程级计数指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub bus_messages: u64,
    pub dropped_malformed: u64,
    pub merges: u64,
    pub merges_rejected: u64,
    pub alarms: u64,
    pub notifications: u64,
    pub pushes_delivered: u64,
    pub pushes_dropped: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub catch_up_pushes: u64,
    pub catch_up_failures: u64,
    pub states_evicted: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    bus_messages: AtomicU64,
    dropped_malformed: AtomicU64,
    merges: AtomicU64,
    merges_rejected: AtomicU64,
    alarms: AtomicU64,
    notifications: AtomicU64,
    pushes_delivered: AtomicU64,
    pushes_dropped: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    catch_up_pushes: AtomicU64,
    catch_up_failures: AtomicU64,
    states_evicted: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            bus_messages: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
            merges: AtomicU64::new(0),
            merges_rejected: AtomicU64::new(0),
            alarms: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
            pushes_delivered: AtomicU64::new(0),
            pushes_dropped: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            catch_up_pushes: AtomicU64::new(0),
            catch_up_failures: AtomicU64::new(0),
            states_evicted: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bus_messages: self.bus_messages.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            merges_rejected: self.merges_rejected.load(Ordering::Relaxed),
            alarms: self.alarms.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            pushes_delivered: self.pushes_delivered.load(Ordering::Relaxed),
            pushes_dropped: self.pushes_dropped.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            catch_up_pushes: self.catch_up_pushes.load(Ordering::Relaxed),
            catch_up_failures: self.catch_up_failures.load(Ordering::Relaxed),
            states_evicted: self.states_evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录总线消息接收次数。
pub fn record_bus_message() {
    metrics().bus_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录无法解析而丢弃的消息。
pub fn record_dropped_malformed() {
    metrics().dropped_malformed.fetch_add(1, Ordering::Relaxed);
}

/// 记录状态合并成功次数。
pub fn record_merge() {
    metrics().merges.fetch_add(1, Ordering::Relaxed);
}

/// 记录被拒绝的合并（缺少设备或负载为空）。
pub fn record_merge_rejected() {
    metrics().merges_rejected.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm() {
    metrics().alarms.fetch_add(1, Ordering::Relaxed);
}

pub fn record_notification() {
    metrics().notifications.fetch_add(1, Ordering::Relaxed);
}

/// 记录推送结果（成功入队数与因队列满/连接断开丢弃数）。
pub fn record_pushes(delivered: u64, dropped: u64) {
    let metrics = metrics();
    metrics
        .pushes_delivered
        .fetch_add(delivered, Ordering::Relaxed);
    metrics.pushes_dropped.fetch_add(dropped, Ordering::Relaxed);
}

pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_closed() {
    metrics().connections_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅补发的推送条数。
pub fn record_catch_up_pushes(count: u64) {
    metrics()
        .catch_up_pushes
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录补发回读失败（上游不可用或超时）。
pub fn record_catch_up_failure() {
    metrics().catch_up_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录清扫回收的过期状态数。
pub fn record_states_evicted(count: u64) {
    metrics().states_evicted.fetch_add(count, Ordering::Relaxed);
}
