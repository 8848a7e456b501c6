use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "news_fetch_batches_total",
            "Batches accepted into the entry cache."
        );
        describe_counter!(
            "news_fetch_entries_total",
            "Entries appended by accepted batches."
        );
        describe_counter!(
            "news_fetch_rejected_total",
            "Batches discarded because they could not be parsed or stored."
        );
        describe_counter!(
            "news_prune_expired_total",
            "Entries removed by the expiry check."
        );
        describe_counter!(
            "news_prune_duplicates_total",
            "Entries collapsed onto a later entry with the same key."
        );
        describe_counter!(
            "news_load_skipped_total",
            "Bulk-load candidates dropped (label: reason)."
        );
        describe_counter!("news_dismissed_total", "Entries dismissed.");
        describe_gauge!("news_entries", "Entries currently in the cache.");
        describe_gauge!("news_last_fetch_ts", "Unix ts of the last accepted batch.");
    });
}

/// Compact fmt logging filtered by `RUST_LOG`, defaulting to `news=info,warn`.
/// No-op if a global subscriber is already installed (e.g. by the runtime).
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if a recorder is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
