// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Off-chain content resolution
//!
//! Content URIs on Lens are either plain http(s) URLs or IPFS addresses.
//! IPFS addresses (and the retired infura gateway) are rewritten to a list of
//! gateway mirrors; anything else is rejected without a fetch.

use crate::metrics::CollectorMetrics;
use cid::Cid;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Gateway used for stored picture URIs.
pub const CANONICAL_GATEWAY: &str = "https://lens.infura-ipfs.io/ipfs/";

const GATEWAY_MIRRORS: &[&str] = &[CANONICAL_GATEWAY, "https://ipfs.io/ipfs/"];

/// Prefixes that cannot be fetched directly and are rewritten to a gateway.
const REWRITTEN_PREFIXES: &[&str] = &["ipfs://", "https://ipfs.infura.io/ipfs/"];

#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid content: {0}")]
    Decode(String),
}

/// Fetches a JSON document by URL.
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, ContentError>;
}

pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl HttpContentFetcher {
    pub fn new() -> Result<Self, ContentError> {
        let client = reqwest::Client::builder()
            .user_agent("lens-collector/0.1")
            .build()
            .map_err(|e| ContentError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, ContentError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContentError::Timeout
                } else {
                    ContentError::Transport(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Http {
                status: status.as_u16(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ContentError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ContentResolverConfig {
    pub timeout: Duration,
    pub retries: usize,
    pub retry_delay: Duration,
}

impl Default for ContentResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

pub struct ContentResolver {
    fetcher: Arc<dyn ContentFetcher>,
    config: ContentResolverConfig,
    metrics: Option<Arc<CollectorMetrics>>,
}

impl ContentResolver {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, config: ContentResolverConfig) -> Self {
        Self {
            fetcher,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CollectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .content_fetch_total
                .with_label_values(&[outcome])
                .inc();
        }
    }

    /// Fetches and normalizes the document behind `uri`. Returns `None` for
    /// unfetchable URIs and once every attempt failed.
    pub async fn resolve(&self, uri: &str) -> Option<Value> {
        let candidates = candidate_urls(uri);
        if candidates.is_empty() {
            debug!("[ContentResolver] Rejected uri {}", uri);
            self.record("rejected");
            return None;
        }

        let attempts = self.config.retries.max(1);
        for attempt in 0..attempts {
            let url = &candidates[attempt % candidates.len()];
            match self.fetcher.get_json(url, self.config.timeout).await {
                Ok(Value::Null) => debug!("[ContentResolver] Empty document at {}", url),
                Ok(data) => {
                    self.record("ok");
                    return Some(normalize_metadata(data));
                }
                Err(e) => debug!(
                    "[ContentResolver] Fetch {} failed (attempt {}/{}): {}",
                    url,
                    attempt + 1,
                    attempts,
                    e
                ),
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
        warn!("[ContentResolver] Giving up on {}", uri);
        self.record("failed");
        None
    }
}

/// URLs to try for `uri`, in order. IPFS-style URIs must end in a valid CID.
pub fn candidate_urls(uri: &str) -> Vec<String> {
    if let Some(prefix) = REWRITTEN_PREFIXES.iter().find(|p| uri.starts_with(**p)) {
        let rest = &uri[prefix.len()..];
        let cid = rest.rsplit('/').next().unwrap_or(rest);
        if Cid::try_from(cid).is_err() {
            return vec![];
        }
        return GATEWAY_MIRRORS
            .iter()
            .map(|base| format!("{}{}", base, rest))
            .collect();
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return vec![uri.to_string()];
    }
    vec![]
}

/// Renames the snake_case cover picture some clients publish.
pub fn normalize_metadata(mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        if let Some(cover) = map.remove("cover_picture") {
            if !cover.is_null() {
                map.insert("coverPicture".to_string(), cover);
            }
        }
    }
    data
}

/// Stored form of a picture URI: IPFS addresses point at the canonical
/// gateway, everything else is kept.
pub fn real_image_uri(uri: &str) -> String {
    for prefix in REWRITTEN_PREFIXES {
        if let Some(rest) = uri.strip_prefix(prefix) {
            return format!("{}{}", CANONICAL_GATEWAY, rest);
        }
    }
    uri.to_string()
}

/// Picture fields returned by the Lens API are either `{uri}` or a
/// (possibly nested) `{original: {url}}` media set.
pub fn real_image_uri_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(real_image_uri(s)),
        Value::Object(map) => {
            if let Some(original) = map.get("original") {
                return original.get("url").and_then(real_image_uri_value);
            }
            map.get("uri").and_then(real_image_uri_value)
        }
        _ => None,
    }
}
