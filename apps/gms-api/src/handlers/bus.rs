//! 总线生产者接口：规范化后发布。
//!
//! - POST /api/bus/publish `{channel, data}`
//! - POST /api/telemetry
//! - POST /api/alarms

use api_contract::{PublishRequest, PublishResponse};
use axum::{Json, extract::State, response::Response};
use gms_ingest::BusChannel;
use gms_normalize::{alarm_to_json, telemetry_to_json};
use serde_json::Value;
use tracing::{info, warn};

use crate::AppState;
use crate::utils::response::{bad_request_error, bus_unavailable_error, ok};

pub async fn publish(State(state): State<AppState>, Json(req): Json<PublishRequest>) -> Response {
    match BusChannel::parse(&req.channel) {
        Ok(channel) => publish_to(&state, channel, &req.data).await,
        Err(err) => bad_request_error(err.to_string()),
    }
}

pub async fn publish_telemetry(State(state): State<AppState>, Json(data): Json<Value>) -> Response {
    publish_to(&state, BusChannel::Telemetry, &data).await
}

pub async fn publish_alarm(State(state): State<AppState>, Json(data): Json<Value>) -> Response {
    publish_to(&state, BusChannel::Alarms, &data).await
}

async fn publish_to(state: &AppState, channel: BusChannel, data: &Value) -> Response {
    let received_at_ms = domain::now_epoch_ms();
    let normalized = match channel {
        BusChannel::Telemetry => state
            .normalizer
            .normalize_telemetry_value(data, received_at_ms)
            .map(|event| telemetry_to_json(&event)),
        BusChannel::Alarms => state
            .normalizer
            .normalize_alarm_value(data, received_at_ms)
            .map(|alarm| alarm_to_json(&alarm)),
    };
    let payload = match normalized {
        Ok(payload) => payload,
        Err(err) => return bad_request_error(err.to_string()),
    };

    match state.publisher.publish(channel, &payload).await {
        Ok(receivers) => {
            info!(
                target: "gms.api",
                channel = %channel,
                receivers = receivers,
                "bus_publish_accepted"
            );
            ok(PublishResponse {
                channel: channel.as_str().to_string(),
                receivers,
                payload,
            })
        }
        Err(err) => {
            warn!(target: "gms.api", channel = %channel, error = %err, "bus_publish_failed");
            bus_unavailable_error(err.to_string())
        }
    }
}
