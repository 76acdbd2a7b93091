// src/api.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::AppConfig;
use crate::fetch::{CachingFetcher, Fetcher, HttpFetcher, SingleSlotCache};
use crate::pipeline::{self, PipelineError, PipelineOptions};

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml";

#[derive(Clone)]
pub struct AppState {
    fetcher: Arc<dyn Fetcher>,
    config: Arc<AppConfig>,
    options: Arc<PipelineOptions>,
}

impl AppState {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: AppConfig) -> Self {
        let options = PipelineOptions::from(&config);
        Self {
            fetcher,
            config: Arc::new(config),
            options: Arc::new(options),
        }
    }

    /// Production wiring: HTTP fetcher, behind the payload cache unless disabled.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        let fetcher: Arc<dyn Fetcher> = if config.cache_bucket_secs > 0 {
            Arc::new(CachingFetcher::new(
                http,
                Arc::new(SingleSlotCache::new()),
                config.cache_bucket_secs,
            ))
        } else {
            Arc::new(http)
        };
        Ok(Self::new(fetcher, config))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/", get(filtered_feed))
        .route("/health", get(|| async { "OK" }))
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
        .with_state(state)
}

async fn filtered_feed(State(state): State<AppState>) -> Response {
    let result = pipeline::run(
        state.fetcher.as_ref(),
        &state.config.source_urls,
        &state.options,
    )
    .await;

    match result {
        Ok(doc) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, RSS_CONTENT_TYPE.to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", state.config.max_age_secs),
                ),
            ],
            doc.into_string(),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &PipelineError) -> Response {
    let status = e.status_code();
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!(error = %e, "feed pipeline failed");
    } else {
        tracing::warn!(error = %e, status = status.as_u16(), "feed unavailable");
    }
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        e.public_message(),
    )
        .into_response()
}
