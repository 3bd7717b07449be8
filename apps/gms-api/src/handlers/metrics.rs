//! 健康检查与指标快照。
//!
//! - GET /health
//! - GET /metrics

use api_contract::MetricsSnapshotDto;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use gms_telemetry::metrics;

use crate::AppState;
use crate::utils::response::ok;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    ok(MetricsSnapshotDto {
        bus_messages: snapshot.bus_messages,
        dropped_malformed: snapshot.dropped_malformed,
        merges: snapshot.merges,
        merges_rejected: snapshot.merges_rejected,
        alarms: snapshot.alarms,
        notifications: snapshot.notifications,
        pushes_delivered: snapshot.pushes_delivered,
        pushes_dropped: snapshot.pushes_dropped,
        connections_opened: snapshot.connections_opened,
        connections_closed: snapshot.connections_closed,
        catch_up_pushes: snapshot.catch_up_pushes,
        catch_up_failures: snapshot.catch_up_failures,
        states_evicted: snapshot.states_evicted,
        cached_devices: state.engine.store().keys().len(),
    })
}
