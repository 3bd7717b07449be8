//! GMS 实时推送服务：总线接入、状态合并与 WebSocket 推送。

mod handlers;
mod ingest;
mod middleware;
mod routes;
mod utils;

use gms_config::AppConfig;
use gms_ingest::Publisher;
use gms_normalize::Normalizer;
use gms_realtime::{EngineConfig, RealtimeEngine};
use gms_state::StateStoreConfig;
use gms_storage::{NoopTelemetryLookup, PgTelemetryLookup, TelemetryLookup};
use gms_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RealtimeEngine>,
    pub normalizer: Arc<Normalizer>,
    pub publisher: Arc<dyn Publisher>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 补发回读：未配置数据库时只读缓存
    let lookup: Arc<dyn TelemetryLookup> = match config.database_url.as_deref() {
        Some(url) => {
            info!(target: "gms.api", "telemetry_lookup_postgres");
            Arc::new(PgTelemetryLookup::connect_lazy(url)?)
        }
        None => {
            info!(target: "gms.api", "telemetry_lookup_disabled");
            Arc::new(NoopTelemetryLookup)
        }
    };

    let engine = Arc::new(RealtimeEngine::new(engine_config(&config), lookup));
    let normalizer = Arc::new(Normalizer::default());
    let runtime = ingest::spawn_ingest(&config, Arc::clone(&engine), Arc::clone(&normalizer)).await?;

    let state = AppState {
        engine: Arc::clone(&engine),
        normalizer,
        publisher: Arc::clone(&runtime.publisher),
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "gms.api", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown();
    engine.shutdown();
    info!(target: "gms.api", "server_stopped");
    Ok(())
}

fn engine_config(config: &AppConfig) -> EngineConfig {
    EngineConfig {
        store: StateStoreConfig {
            ttl: Duration::from_secs(config.state_ttl_seconds),
            sweep_interval: Duration::from_secs(config.state_sweep_interval_seconds),
        },
        notification_delay: Duration::from_millis(config.notification_delay_ms),
        catch_up_timeout: Duration::from_millis(config.catch_up_timeout_ms),
        connection_buffer: config.connection_buffer,
        sites: config.sites.clone(),
        site_markers: config.site_markers.clone(),
        default_site: Some(config.default_site.clone()).filter(|site| !site.is_empty()),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "gms.api", error = %err, "shutdown_signal_failed");
        std::future::pending::<()>().await;
    }
    info!(target: "gms.api", "shutdown_requested");
}
