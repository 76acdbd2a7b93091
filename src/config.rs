// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::feed::filter::DEFAULT_LINK_FILTER;
use crate::feed::serialize::DEFAULT_GENERATOR;

pub const ENV_CONFIG_PATH: &str = "FEED_PROXY_CONFIG_PATH";
pub const DEFAULT_CONFIG_TOML: &str = "config/feed_proxy.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/feed_proxy.json";

pub const ENV_SOURCE_URLS: &str = "FEED_SOURCE_URLS";
pub const ENV_LINK_FILTER: &str = "FEED_LINK_FILTER";
pub const ENV_PUBLIC_URL: &str = "FEED_PUBLIC_URL";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "FEED_FETCH_TIMEOUT_SECS";
pub const ENV_CACHE_BUCKET_SECS: &str = "FEED_CACHE_BUCKET_SECS";
pub const ENV_WRAP_PREVIEW: &str = "FEED_WRAP_PREVIEW";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Upstream feed URLs, tried in order.
    pub source_urls: Vec<String>,
    /// Case-insensitive substring an item link must contain.
    pub link_filter: String,
    pub fetch_timeout_secs: u64,
    /// Width of the payload cache time bucket; 0 disables caching.
    pub cache_bucket_secs: u64,
    /// Public URL of the proxied feed (for `atom:link rel="self"`).
    pub public_url: Option<String>,
    pub generator: String,
    pub wrap_preview_in_paragraph: bool,
    /// `Cache-Control: max-age` on successful responses.
    pub max_age_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_urls: vec![
                "https://www.iraqinews.com/rss/".to_string(),
                "https://www.iraqinews.com/feed/".to_string(),
            ],
            link_filter: DEFAULT_LINK_FILTER.to_string(),
            fetch_timeout_secs: 10,
            cache_bucket_secs: 300,
            public_url: None,
            generator: DEFAULT_GENERATOR.to_string(),
            wrap_preview_in_paragraph: false,
            max_age_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: Self = match ext.as_str() {
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("parsing json config {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("parsing toml config {}", path.display()))?,
        };
        Ok(cfg)
    }

    /// Config file lookup:
    /// 1) $FEED_PROXY_CONFIG_PATH
    /// 2) config/feed_proxy.toml
    /// 3) config/feed_proxy.json
    /// 4) built-in defaults
    ///
    /// Environment overrides are applied on top.
    pub fn load_default() -> Result<Self> {
        let mut cfg = Self::load_file_default()?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn load_file_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(urls) = env_nonempty(ENV_SOURCE_URLS) {
            let urls: Vec<String> = urls
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !urls.is_empty() {
                self.source_urls = urls;
            }
        }
        if let Some(filter) = env_nonempty(ENV_LINK_FILTER) {
            self.link_filter = filter;
        }
        if let Some(url) = env_nonempty(ENV_PUBLIC_URL) {
            self.public_url = Some(url);
        }
        if let Some(secs) = parse_u64_env(env_nonempty(ENV_FETCH_TIMEOUT_SECS)) {
            self.fetch_timeout_secs = secs;
        }
        if let Some(secs) = parse_u64_env(env_nonempty(ENV_CACHE_BUCKET_SECS)) {
            self.cache_bucket_secs = secs;
        }
        if let Some(v) = env_nonempty(ENV_WRAP_PREVIEW) {
            self.wrap_preview_in_paragraph = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_urls.is_empty() {
            return Err(anyhow!("at least one source URL is required"));
        }
        if self.link_filter.trim().is_empty() {
            return Err(anyhow!("link_filter must not be empty"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetch_timeout_secs must be positive"));
        }
        Ok(())
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64_env(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.parse::<u64>().ok())
}
