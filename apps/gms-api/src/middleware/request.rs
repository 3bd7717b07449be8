//! 请求上下文中间件
//!
//! 每个请求生成 request_id/trace_id：写入请求扩展、挂到 `request` span 上，
//! 并通过 `x-request-id`/`x-trace-id` 响应头回传给调用方。

use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use gms_telemetry::new_request_ids;
use tracing::{Instrument, info_span};

pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = info_span!(
        target: "gms.api",
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    let headers = response.headers_mut();
    for (name, value) in [
        ("x-request-id", ids.request_id.as_str()),
        ("x-trace-id", ids.trace_id.as_str()),
    ] {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
    response
}
