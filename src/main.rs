use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use profiler_store::clock::{Clock, SystemClock};
use profiler_store::config::Config;
use profiler_store::{server, store, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "profiler_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 1. Configuration ─────────────────────────────────────────
    let config = Config::from_env()?;

    // ── 2. Open the store ────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = store::open(&config.store, clock.clone())
        .await
        .context("failed to open measurement store")?;

    // ── 3. Build router ──────────────────────────────────────────
    let state = Arc::new(AppState { store, clock });
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!(addr = %config.server.bind, "Measurement API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
