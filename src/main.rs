//! Crisis Engine Service - Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.
//!
//! See `README.md` for quickstart and `DESIGN.md` for architecture notes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mindhaven_engine::engine::CrisisEngine;
use mindhaven_engine::gatekeeper::AlertPolicy;
use mindhaven_engine::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - ENGINE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("ENGINE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mindhaven_engine=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // This enables ALERT_POLICY_CONFIG_PATH / SMTP_* / GEMINI_API_KEY from
    // .env so the engine wiring can pick them up.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    // The cooldown gauge is static; counters are registered on first use.
    let policy = AlertPolicy::from_env();
    let metrics = Metrics::init(policy.cooldown_minutes);

    let engine = Arc::new(CrisisEngine::in_memory_from_env());
    let router = mindhaven_engine::create_router(engine).merge(metrics.router());

    Ok(router.into())
}
