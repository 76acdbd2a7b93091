// src/pipeline.rs
//! One request: fetch -> parse -> filter -> normalize -> serialize.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::feed::{
    filter_items, normalize_all, parse_feed, serialize_feed, NormalizeOptions, OutputDocument,
    ParseError, RawFeed, SerializeError, SerializeOptions, SubstringPredicate,
};
use crate::fetch::{FetchError, Fetcher};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no items matched the link filter ({examined} examined)")]
    Empty { examined: usize },

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl PipelineError {
    /// Upstream trouble (unreachable, not a feed, nothing matching) is 503 so
    /// clients retry later; our own faults are 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Fetch(_) | PipelineError::Parse(_) | PipelineError::Empty { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short client-facing message; details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "Failed to fetch the RSS feed",
            PipelineError::Parse(_) => "Upstream feed could not be read",
            PipelineError::Empty { .. } => "No matching items in the upstream feed",
            PipelineError::Serialize(_) => "Internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub link_filter: String,
    pub normalize: NormalizeOptions,
    pub self_link: Option<String>,
    pub generator: String,
}

impl From<&AppConfig> for PipelineOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            link_filter: cfg.link_filter.clone(),
            normalize: NormalizeOptions {
                wrap_preview_in_paragraph: cfg.wrap_preview_in_paragraph,
            },
            self_link: cfg.public_url.clone(),
            generator: cfg.generator.clone(),
        }
    }
}

/// Pure transform of one upstream payload.
pub fn transform(
    raw: &RawFeed,
    opts: &PipelineOptions,
    now: DateTime<Utc>,
) -> Result<OutputDocument, PipelineError> {
    let t0 = std::time::Instant::now();

    let parsed = parse_feed(raw)?;
    let examined = parsed.items.len();

    let predicate = SubstringPredicate::new(&opts.link_filter);
    let kept = filter_items(&parsed.items, &predicate);
    let retained = kept.len();

    let (entries, malformed) = normalize_all(&kept, &opts.normalize);

    counter!("feed_items_examined_total").increment(examined as u64);
    counter!("feed_items_retained_total").increment(entries.len() as u64);
    counter!("feed_items_malformed_total").increment(malformed as u64);
    info!(
        source = %raw.source_url,
        filter = predicate.needle(),
        examined,
        retained,
        malformed,
        "filtered feed"
    );

    if entries.is_empty() {
        return Err(PipelineError::Empty { examined });
    }

    let serialize_opts = SerializeOptions {
        self_link: opts.self_link.clone(),
        generator: opts.generator.clone(),
        build_date: now,
    };
    let doc = serialize_feed(&parsed.channel, &entries, &serialize_opts)?;

    histogram!("feed_transform_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(doc)
}

/// Fetch the first reachable candidate and transform it.
pub async fn run(
    fetcher: &dyn Fetcher,
    candidates: &[String],
    opts: &PipelineOptions,
) -> Result<OutputDocument, PipelineError> {
    counter!("feed_requests_total").increment(1);
    let fetcher_name = fetcher.name();
    let raw = match fetcher.fetch(candidates).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                fetcher = fetcher_name,
                candidates = candidates.len(),
                error = %e,
                "upstream fetch failed"
            );
            return Err(e.into());
        }
    };
    debug!(fetcher = fetcher_name, source = %raw.source_url, "upstream payload ready");
    transform(&raw, opts, Utc::now())
}
