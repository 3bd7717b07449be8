//! 设备状态诊断与管理接口。
//!
//! - GET /api/state
//! - DELETE /api/state
//! - GET /api/state/:device_id
//! - DELETE /api/state/:device_id

use api_contract::ClearStateResponse;
use axum::{
    extract::{Path, State},
    response::Response,
};
use tracing::info;

use crate::AppState;
use crate::utils::response::{not_found_error, ok};

pub async fn list_states(State(state): State<AppState>) -> Response {
    ok(state.engine.store().all())
}

pub async fn clear_states(State(state): State<AppState>) -> Response {
    let removed = state.engine.clear_state();
    ok(ClearStateResponse { removed })
}

pub async fn get_state(State(state): State<AppState>, Path(device_id): Path<String>) -> Response {
    match state.engine.store().get(&device_id) {
        Some(device_state) => ok(device_state),
        None => not_found_error(),
    }
}

pub async fn delete_state(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Response {
    if !state.engine.delete_state(&device_id) {
        return not_found_error();
    }
    info!(target: "gms.api", device_id = %device_id, "device_state_deleted");
    ok(ClearStateResponse { removed: 1 })
}
