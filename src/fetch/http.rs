// src/fetch/http.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::feed::types::RawFeed;
use crate::fetch::{FetchError, Fetcher};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// reqwest-backed fetcher that presents itself as a desktop browser.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_one(&self, url: &str) -> Result<RawFeed> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("http get")?
            .error_for_status()
            .context("upstream status")?;

        let encoding = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);

        let bytes = resp.bytes().await.context("reading body")?;
        let mut raw = RawFeed::new(url, bytes);
        raw.encoding = encoding;
        Ok(raw)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, candidates: &[String]) -> Result<RawFeed, FetchError> {
        if candidates.is_empty() {
            return Err(FetchError::NoCandidates);
        }

        let mut last_error = String::new();
        for url in candidates {
            tracing::debug!(%url, "fetching upstream feed");
            match self.fetch_one(url).await {
                Ok(raw) => {
                    tracing::info!(%url, bytes = raw.bytes.len(), "fetched upstream feed");
                    return Ok(raw);
                }
                Err(e) => {
                    tracing::warn!(error = ?e, %url, "candidate fetch failed");
                    counter!("feed_fetch_errors_total").increment(1);
                    last_error = format!("{url}: {e:#}");
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: candidates.len(),
            last_error,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// `application/rss+xml; charset=ISO-8859-1` -> `ISO-8859-1`
pub fn charset_from_content_type(ct: &str) -> Option<String> {
    ct.split(';')
        .skip(1)
        .filter_map(|part| part.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}
