use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::routing::get;
use axum::Router;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use axum::http::HeaderValue;
use tracing::info;

use fightjudge_backend::context::{BoutSupervisor, PipelineContext};
use fightjudge_backend::persistence::{FileStore, Store};
use fightjudge_backend::timesvc::UnifiedClock;

// ─── Global startup time (for uptime reporting) ──────────────────────────────
static STARTUP_MS: AtomicU64 = AtomicU64::new(0);

// ─── Time Sync Endpoint ───────────────────────────────────────────────────────

async fn time_sync() -> axum::Json<serde_json::Value> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    axum::Json(json!({ "serverTime": now }))
}

// ─── Health Endpoint ──────────────────────────────────────────────────────────
// GET /health → { status, version, mode, uptimeSecs }
async fn health_check() -> axum::Json<serde_json::Value> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let startup = STARTUP_MS.load(Ordering::Relaxed);
    let uptime_secs = if startup > 0 { (now_ms - startup) / 1000 } else { 0 };
    let mode = if std::env::var("FJ_DATA_DIR").is_ok() { "file" } else { "memory" };
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": mode,
        "uptimeSecs": uptime_secs,
    }))
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record startup time for uptime reporting
    let startup_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    STARTUP_MS.store(startup_ms, Ordering::Relaxed);

    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fightjudge_backend=info".into()),
        )
        .init();

    // Storage mode: file-backed under FJ_DATA_DIR, memory otherwise
    let store = match std::env::var("FJ_DATA_DIR") {
        Ok(dir) => {
            info!("🗄  file store at {dir}");
            Store::File(FileStore::open(&dir).await?)
        }
        Err(_) => {
            info!("🗄  in-memory store (set FJ_DATA_DIR for persistence)");
            Store::in_memory()
        }
    };

    info!("🥊 FightJudge Backend (Rust) v{} starting", env!("CARGO_PKG_VERSION"));

    // Pipeline context: storage, bus, audit, calibration, clock
    let ctx = PipelineContext::new(store, UnifiedClock::new()).await?;
    let supervisor = BoutSupervisor::new(ctx);
    info!(
        "pipeline ready (calibration v{})",
        supervisor.context().calibration.current().version
    );

    // CORS — local dev consoles by default; cloud sets CORS_ORIGINS=*
    let cors_origins_env = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    let cors = if cors_origins_env.trim() == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins_env
            .split(',')
            .filter_map(|o| o.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Thin service edge: transport/routing beyond health + time sync lives
    // outside this crate and talks to BoutSupervisor directly
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/sync", get(time_sync))
        .layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");
    info!("🚀 Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
