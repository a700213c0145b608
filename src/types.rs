use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque identifier of one external feed adapter.
pub type FeedId = String;

/// Cache key for a (feed, language) pair.
///
/// The on-disk format predates this implementation, so the key shape is
/// fixed: `"{feed_id}_{language_tag}"`.
pub fn cache_key(feed_id: &str, language_tag: &str) -> String {
    format!("{}_{}", feed_id, language_tag)
}

/// A single entry from a feed, in adapter order.
///
/// Field names follow the legacy JSON payload (camelCase) so entries written
/// by earlier versions of the service remain readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: ItemExtra,
}

/// Optional adapter-supplied metadata attached to an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemExtra {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
}

impl FeedItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            secondary_url: None,
            published_at: None,
            extra: ItemExtra::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.extra.description = Some(description.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// One cached item list for a (feed, language) pair.
///
/// Entries are overwritten wholesale on refresh and handed to callers as
/// freshly decoded owned values, so a caller can never mutate a list shared
/// with anyone else.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The unit returned to callers for one feed request.
///
/// Always fully populated, including on failure: callers render whatever
/// they receive and are expected to offer a retry action, never to crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub status: ResponseStatus,
    pub id: FeedId,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<FeedItem>,
    pub language_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FeedResponse {
    pub fn success(
        id: impl Into<FeedId>,
        updated_at: DateTime<Utc>,
        items: Vec<FeedItem>,
        language_tag: impl Into<String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            id: id.into(),
            updated_at,
            items,
            language_tag: language_tag.into(),
            message: None,
        }
    }

    pub fn error(
        id: impl Into<FeedId>,
        language_tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Error,
            id: id.into(),
            updated_at: Utc::now(),
            items: Vec::new(),
            language_tag: language_tag.into(),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("adapter fetch failed for {feed}: {message}")]
    AdapterFetch { feed: String, message: String },

    #[error("translation request failed: {0}")]
    Translation(String),

    #[error("translation rate limited: {message}")]
    RateLimited {
        message: String,
        /// Wait hint sent by the upstream, from a Retry-After header.
        retry_after: Option<Duration>,
    },

    #[error("fetch for {feed} timed out after {timeout_secs}s")]
    Timeout { feed: String, timeout_secs: u64 },

    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),

    #[error("unknown feed: {id}")]
    UnknownFeed { id: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    General(String),
}

impl GatewayError {
    /// The upstream's own wait hint, when the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
