//! Topic feed proxy: binary entrypoint.
//! Boots the Axum HTTP server: config, tracing, metrics, and the feed route.

use shuttle_axum::ShuttleAxum;
use topic_feed_proxy::{api, metrics::Metrics, AppConfig, AppState};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    topic_feed_proxy::init_tracing();

    let config = AppConfig::load_default()?;
    tracing::info!(
        sources = ?config.source_urls,
        filter = %config.link_filter,
        cache_bucket_secs = config.cache_bucket_secs,
        "starting feed proxy"
    );

    let state = AppState::from_config(config)?;
    let mut router = api::router(state);

    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = ?e, "metrics disabled"),
    }

    Ok(router.into())
}
