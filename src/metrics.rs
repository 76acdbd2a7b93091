use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the pipeline series.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("feed_requests_total", "Feed requests handled.");
        describe_counter!(
            "feed_items_examined_total",
            "Upstream items seen before filtering."
        );
        describe_counter!(
            "feed_items_retained_total",
            "Items emitted after filtering and normalization."
        );
        describe_counter!(
            "feed_items_malformed_total",
            "Matching items dropped for missing title/link."
        );
        describe_counter!("feed_fetch_errors_total", "Failed candidate URL fetches.");
        describe_counter!("feed_cache_hits_total", "Upstream payloads served from cache.");
        describe_histogram!("feed_transform_ms", "Parse-to-serialize time in milliseconds.");

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
