//! News injector service: binary entrypoint
//! Boots the Axum HTTP server over the configured entry cache.

use news_injector::api::{self, AppState};
use news_injector::config::NewsConfig;
use news_injector::telemetry::{init_tracing, Metrics};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = NewsConfig::load_default()?;
    tracing::info!(
        target: "news",
        feed_url = %cfg.feed_url,
        pk_offset = cfg.pk_offset,
        state_path = ?cfg.state_path,
        "starting news injector"
    );

    // Recorder first so the cache's metric descriptions land in it.
    let metrics = Metrics::init()?;
    let state = AppState::from_config(&cfg)?;
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
