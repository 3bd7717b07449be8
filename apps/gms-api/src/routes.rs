//! 路由定义
//!
//! - 健康检查与指标：/health, /metrics
//! - 状态诊断与管理：/api/state/*
//! - 总线生产者：/api/bus/publish, /api/telemetry, /api/alarms
//! - 实时推送：/ws, /api/realtime/connections

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/api/state", get(list_states).delete(clear_states))
        .route("/api/state/:device_id", get(get_state).delete(delete_state))
        .route("/api/bus/publish", post(publish))
        .route("/api/telemetry", post(publish_telemetry))
        .route("/api/alarms", post(publish_alarm))
        .route("/api/realtime/connections", get(connection_stats))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}
