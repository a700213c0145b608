use crate::retry::RetryPolicy;

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Hard bound shared by all feeds: beyond this age a cached entry must
    /// not be served without a refetch attempt.
    pub cache_ttl_secs: u64,
    /// Bound on one synchronous adapter fetch (including translation and the
    /// cache write).
    pub fetch_timeout_secs: u64,
    /// When false the gateway runs in always-fetch mode and never persists.
    pub cache_enabled: bool,
    /// When true the cache store creates its table on startup.
    pub cache_schema_init: bool,
    pub database_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 86_400,
            fetch_timeout_secs: 30,
            cache_enabled: true,
            cache_schema_init: true,
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

/// Static per-feed configuration held by the adapter registry.
#[derive(Debug, Clone)]
pub struct FeedSpec {
    /// Minimum expected time between real content changes for this feed.
    /// Some feeds update every few minutes, others hourly.
    pub refresh_interval_secs: u64,
    /// Language the feed publishes in; requests for any other language go
    /// through the translation pipeline before the cache write.
    pub native_lang: String,
}

impl FeedSpec {
    pub fn new(refresh_interval_secs: u64, native_lang: impl Into<String>) -> Self {
        Self {
            refresh_interval_secs,
            native_lang: native_lang.into(),
        }
    }
}

/// Settings for the translation batch executor.
#[derive(Debug, Clone)]
pub struct TranslateConfig {
    /// Number of texts translated concurrently per group; groups run
    /// sequentially to respect upstream rate limits.
    pub group_size: usize,
    /// Backpressure delay inserted between groups.
    pub group_delay_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            group_size: 3,
            group_delay_ms: 250,
            retry: RetryPolicy::default(),
        }
    }
}

/// Settings for the bundled HTTP translation backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/translate".to_string(),
            api_key: None,
            user_agent: "feed-gateway/0.1".to_string(),
            timeout_secs: 15,
        }
    }
}
