//! Core shared utilities for the model promotion services.
//!
//! Provides tracing bootstrap, the health/metrics HTTP endpoints, layered
//! configuration loading and retry primitives. Service crates keep their
//! domain logic local and lean on this layer for the operational surface.

use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }

/// Initialize the tracing subscriber once per process.
///
/// `PROMOTER_JSON_LOG=1` switches to flattened JSON events for log shipping;
/// the filter comes from `RUST_LOG` as usual.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let json = std::env::var("PROMOTER_JSON_LOG")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::from_default_env();
        if json {
            tracing_subscriber::fmt()
                .json()
                .flatten_event(true)
                .with_env_filter(env_filter)
                .try_init()
                .map_err(|e| anyhow!("tracing init failed: {e}"))?;
        } else {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_line_number(true)
                .with_env_filter(env_filter)
                .try_init()
                .map_err(|e| anyhow!("tracing init failed: {e}"))?;
        }
        Ok::<(), anyhow::Error>(())
    })?;
    info!(target: "promoter", service, "tracing_initialized");
    Ok(())
}

/// Spawn the health server: `/live`, `/ready`, `/status`, `/metrics`.
pub async fn start_health_server(port: u16) -> Result<()> {
    let app = Router::new()
        .route("/live", get(|| async {
            axum::Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)}))
        }))
        .route("/ready", get(|| async {
            axum::Json(serde_json::json!({"ready": NODE_READINESS.load(Ordering::SeqCst)}))
        }))
        .route("/status", get(|| async {
            axum::Json(serde_json::json!({
                "live": NODE_LIVENESS.load(Ordering::SeqCst),
                "ready": NODE_READINESS.load(Ordering::SeqCst),
            }))
        }))
        .route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "health_server_listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error=?e, "health_server_failed");
        }
    });
    Ok(())
}

async fn metrics_handler() -> axum::response::Response {
    let metric_families = prometheus::default_registry().gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return axum::response::Response::builder()
            .status(500)
            .body(axum::body::Body::from(format!("encode error: {e}")))
            .unwrap();
    }
    axum::response::Response::builder()
        .status(200)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(axum::body::Body::from(buf))
        .unwrap()
}

mod config;
pub use config::{load_config, PromoterConfig};

mod resilience;
pub use resilience::{with_backoff, BackoffPolicy};
