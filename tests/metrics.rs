// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use topic_feed_proxy::feed::RawFeed;
use topic_feed_proxy::fetch::{FetchError, Fetcher};
use topic_feed_proxy::metrics::Metrics;
use topic_feed_proxy::{router, AppConfig, AppState};

const FIXTURE: &str = include_str!("fixtures/news_rss.xml");

struct FixtureFetcher;

#[async_trait::async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, _candidates: &[String]) -> Result<RawFeed, FetchError> {
        Ok(RawFeed::new("fixture", FIXTURE.as_bytes().to_vec()))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

// Single test: the Prometheus recorder is process-global.
#[tokio::test]
async fn feed_request_shows_up_in_exposition() {
    let metrics = Metrics::init().expect("install recorder");
    let app = router(AppState::new(Arc::new(FixtureFetcher), AppConfig::default()))
        .merge(metrics.router());

    let r = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(r.status(), StatusCode::OK);

    let m = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(m.status(), StatusCode::OK);
    let body = body::to_bytes(m.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "feed_requests_total",
        "feed_items_examined_total",
        "feed_items_retained_total",
        "feed_transform_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    assert!(text.contains("feed_items_examined_total 4"), "{text}");
    assert!(text.contains("feed_items_retained_total 2"), "{text}");
}
