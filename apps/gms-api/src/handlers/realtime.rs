//! 实时推送接口。
//!
//! - GET /ws：WebSocket，客户端发送订阅指令，服务端推送 `{event, data}` 帧
//! - GET /api/realtime/connections：在线连接与房间统计

use api_contract::{ClientCommand, ConnectionStatsDto, ServerFrame, SubscriptionAck};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use gms_realtime::{ConnectionId, GatewayError, RealtimeEngine, Subscribed};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::utils::response::ok;

/// 控制帧（订阅确认、错误、pong）队列长度。
const CONTROL_BUFFER: usize = 16;

pub async fn connection_stats(State(state): State<AppState>) -> Response {
    let gateway = state.engine.gateway();
    ok(ConnectionStatsDto {
        connections: gateway.connection_count().await,
        rooms: gateway.room_counts().await,
    })
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

async fn handle_socket(socket: WebSocket, engine: Arc<RealtimeEngine>) {
    let (id, mut pushes) = engine.connect().await;
    let (mut sender, mut receiver) = socket.split();
    let (control_tx, mut control_rx) = mpsc::channel::<String>(CONTROL_BUFFER);
    info!(target: "gms.api", connection_id = id, "ws_connected");

    loop {
        tokio::select! {
            Some(push) = pushes.recv() => {
                if sender.send(Message::Text(push.frame().to_string())).await.is_err() {
                    break;
                }
            }
            Some(frame) = control_rx.recv() => {
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_command(&engine, id, &text, &control_tx).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(target: "gms.api", connection_id = id, error = %err, "ws_receive_failed");
                    break;
                }
            }
        }
    }

    engine.disconnect(id).await;
    info!(target: "gms.api", connection_id = id, "ws_disconnected");
}

async fn handle_command(
    engine: &Arc<RealtimeEngine>,
    id: ConnectionId,
    text: &str,
    control: &mpsc::Sender<String>,
) {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(err) => {
            debug!(target: "gms.api", connection_id = id, error = %err, "ws_command_invalid");
            send_error(control, "INVALID.COMMAND", err.to_string());
            return;
        }
    };

    match command {
        // 补发可能等待上游回读，放到独立任务里，不阻塞本连接的推送
        ClientCommand::Subscribe { device_id } => {
            let engine = Arc::clone(engine);
            let control = control.clone();
            tokio::spawn(async move {
                let result = engine.subscribe(id, &device_id).await;
                send_subscribe_result(&control, id, result);
            });
        }
        ClientCommand::SubscribePlant { plant_id } => {
            let engine = Arc::clone(engine);
            let control = control.clone();
            tokio::spawn(async move {
                let result = engine.subscribe_plant(id, &plant_id).await;
                send_subscribe_result(&control, id, result);
            });
        }
        ClientCommand::Unsubscribe { device_id } => {
            let left = engine.unsubscribe(id, &device_id).await;
            let data = serde_json::json!({ "deviceId": device_id, "left": left });
            send_frame(control, "unsubscribed", data);
        }
        ClientCommand::UnsubscribePlant { plant_id } => {
            let left = engine.unsubscribe_plant(id, &plant_id).await;
            let data = serde_json::json!({ "plantId": plant_id, "left": left });
            send_frame(control, "unsubscribed", data);
        }
        ClientCommand::Ping => send_frame(control, "pong", serde_json::Value::Null),
    }
}

fn send_subscribe_result(
    control: &mpsc::Sender<String>,
    id: ConnectionId,
    result: Result<Subscribed, GatewayError>,
) {
    match result {
        Ok(subscribed) => {
            debug!(
                target: "gms.api",
                connection_id = id,
                room = %subscribed.room,
                joined = subscribed.joined,
                caught_up = subscribed.caught_up,
                "ws_subscribed"
            );
            let ack = SubscriptionAck {
                room: subscribed.room.to_string(),
                joined: subscribed.joined,
                caught_up: subscribed.caught_up,
            };
            send_frame(control, "subscribed", ack);
        }
        // 连接已断开时没有可回复的对象
        Err(GatewayError::UnknownConnection(_)) => {}
        Err(err) => send_error(control, "INVALID.SUBSCRIPTION", err.to_string()),
    }
}

fn send_error(control: &mpsc::Sender<String>, code: &'static str, message: String) {
    send_frame(
        control,
        "error",
        serde_json::json!({ "code": code, "message": message }),
    );
}

fn send_frame<T: Serialize>(control: &mpsc::Sender<String>, event: &'static str, data: T) {
    let frame = match serde_json::to_string(&ServerFrame::new(event, data)) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(target: "gms.api", event = event, error = %err, "ws_frame_serialize_failed");
            return;
        }
    };
    // 发送方与消费方同在连接循环内，不能等待；队列满时丢弃控制帧
    if let Err(err) = control.try_send(frame) {
        debug!(target: "gms.api", event = event, error = %err, "ws_control_frame_dropped");
    }
}
