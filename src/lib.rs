pub mod adapter;
pub mod batch;
pub mod cache;
pub mod config;
pub mod fanout;
pub mod freshness;
pub mod quality;
pub mod refresh;
pub mod resolver;
pub mod retry;
pub mod translator;
pub mod types;

pub use adapter::{AdapterRegistry, FeedAdapter, StaticFeedAdapter};
pub use batch::BatchTranslator;
pub use cache::CacheStore;
pub use config::{FeedSpec, GatewayConfig, HttpBackendConfig, TranslateConfig};
pub use freshness::{Freshness, FreshnessPolicy, ServePlan};
pub use quality::{
    has_marker, tag_untranslated, AnchorPair, HeuristicQualityGuard, QualityCheck, RejectReason,
    Verdict, UNTRANSLATED_MARKER,
};
pub use refresh::RefreshTracker;
pub use resolver::{FeedGateway, GatewayBuilder};
pub use retry::RetryPolicy;
pub use translator::{HttpTranslateBackend, MockTranslateBackend, TranslateBackend};
pub use types::*;
