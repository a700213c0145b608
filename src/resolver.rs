//! Single-feed orchestration: freshness decision, fetch, translate, store.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{AdapterRegistry, FeedAdapter};
use crate::batch::BatchTranslator;
use crate::cache::CacheStore;
use crate::config::{FeedSpec, GatewayConfig, TranslateConfig};
use crate::freshness::{Freshness, FreshnessPolicy, ServePlan};
use crate::quality::QualityCheck;
use crate::refresh::RefreshTracker;
use crate::translator::{MockTranslateBackend, TranslateBackend};
use crate::types::{cache_key, CacheEntry, FeedId, FeedItem, FeedResponse, GatewayError, Result};

/// Counters exposed for monitoring; cheap enough to bump on every request.
#[derive(Default)]
pub struct GatewayStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    stale_served: AtomicU64,
    sync_fetches: AtomicU64,
    background_refreshes: AtomicU64,
    fetch_failures: AtomicU64,
    timeouts: AtomicU64,
    error_responses: AtomicU64,
}

impl GatewayStats {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sync_fetch(&self) {
        self.sync_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_background_refresh(&self) {
        self.background_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error_response(&self) {
        self.error_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert("requests".to_string(), self.requests.load(Ordering::Relaxed));
        stats.insert("cache_hits".to_string(), self.cache_hits.load(Ordering::Relaxed));
        stats.insert(
            "stale_served".to_string(),
            self.stale_served.load(Ordering::Relaxed),
        );
        stats.insert(
            "sync_fetches".to_string(),
            self.sync_fetches.load(Ordering::Relaxed),
        );
        stats.insert(
            "background_refreshes".to_string(),
            self.background_refreshes.load(Ordering::Relaxed),
        );
        stats.insert(
            "fetch_failures".to_string(),
            self.fetch_failures.load(Ordering::Relaxed),
        );
        stats.insert("timeouts".to_string(), self.timeouts.load(Ordering::Relaxed));
        stats.insert(
            "error_responses".to_string(),
            self.error_responses.load(Ordering::Relaxed),
        );
        stats
    }
}

pub(crate) struct GatewayInner {
    pub(crate) registry: AdapterRegistry,
    pub(crate) cache: CacheStore,
    pub(crate) translator: BatchTranslator,
    pub(crate) tracker: Arc<RefreshTracker>,
    pub(crate) config: GatewayConfig,
    pub(crate) stats: GatewayStats,
}

/// The gateway callers talk to: one instance owns the cache, the adapter
/// registry, the translator, and the in-flight refresh tracker.
///
/// Cloning is cheap and every clone shares the same state, which is how
/// background refresh tasks keep access after the request that spawned
/// them has returned.
#[derive(Clone)]
pub struct FeedGateway {
    pub(crate) inner: Arc<GatewayInner>,
}

impl FeedGateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Resolve one feed in one language.
    ///
    /// Fails only when the id does not resolve to a registered feed; every
    /// other problem is absorbed into the response so callers always get
    /// something renderable. `wants_latest` schedules a background
    /// revalidation when the served entry is past its refresh interval.
    pub async fn resolve(
        &self,
        feed_id: &str,
        language_tag: &str,
        wants_latest: bool,
    ) -> Result<FeedResponse> {
        self.inner.stats.record_request();
        let request_id = Uuid::new_v4();

        let canonical = self.inner.registry.resolve_id(feed_id)?;
        let spec = match self.inner.registry.get(&canonical) {
            Some(registered) => registered.spec.clone(),
            None => {
                return Err(GatewayError::UnknownFeed {
                    id: feed_id.to_string(),
                })
            }
        };
        let policy = FreshnessPolicy::new(spec.refresh_interval_secs, self.inner.config.cache_ttl_secs);
        let key = cache_key(&canonical, language_tag);

        let entry = self.inner.cache.get(&key).await;
        let freshness = policy.classify(entry.as_ref(), Utc::now());
        let plan = FreshnessPolicy::plan_for(freshness, wants_latest);
        debug!(
            "[{}] Resolving {} ({}): {:?} -> {:?}",
            request_id, feed_id, language_tag, freshness, plan
        );

        match (plan, entry) {
            (ServePlan::ServeCached, Some(entry)) => {
                self.inner.stats.record_cache_hit();
                if freshness == Freshness::StaleUsable {
                    self.inner.stats.record_stale_served();
                }
                Ok(FeedResponse::success(
                    feed_id,
                    entry.updated_at,
                    entry.items,
                    language_tag,
                ))
            }
            (ServePlan::ServeCachedRevalidate, Some(entry)) => {
                self.inner.stats.record_cache_hit();
                self.inner.stats.record_stale_served();
                info!(
                    "[{}] Serving stale entry for {} and revalidating in background",
                    request_id, key
                );
                self.spawn_revalidate(canonical.clone(), language_tag.to_string());
                Ok(FeedResponse::success(
                    feed_id,
                    entry.updated_at,
                    entry.items,
                    language_tag,
                ))
            }
            (_, entry) => {
                self.fetch_and_respond(request_id, feed_id, &canonical, language_tag, policy, entry)
                    .await
            }
        }
    }

    pub fn stats(&self) -> HashMap<String, u64> {
        self.inner.stats.snapshot()
    }

    pub async fn cache_stats(&self) -> HashMap<String, i64> {
        self.inner.cache.stats().await
    }

    pub fn feed_ids(&self) -> Vec<FeedId> {
        self.inner.registry.feed_ids()
    }

    /// Drop the cached entry for a (feed, language) pair.
    pub async fn invalidate(&self, feed_id: &str, language_tag: &str) -> Result<()> {
        let canonical = self.inner.registry.resolve_id(feed_id)?;
        self.inner.cache.delete(&cache_key(&canonical, language_tag)).await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.inner.cache.delete_all().await
    }

    /// Fetch synchronously and respond. A failed or timed out fetch falls
    /// back to the existing entry whatever its age; only with nothing
    /// cached at all does the caller see an error response.
    async fn fetch_and_respond(
        &self,
        request_id: Uuid,
        requested_id: &str,
        canonical: &str,
        language_tag: &str,
        policy: FreshnessPolicy,
        fallback: Option<CacheEntry>,
    ) -> Result<FeedResponse> {
        match self.refresh_with_tracker(canonical, language_tag, policy).await {
            Ok(entry) => {
                debug!(
                    "[{}] Fetched {} items for {}",
                    request_id,
                    entry.items.len(),
                    canonical
                );
                Ok(FeedResponse::success(
                    requested_id,
                    entry.updated_at,
                    entry.items,
                    language_tag,
                ))
            }
            Err(e) => {
                self.inner.stats.record_fetch_failure();
                if let Some(entry) = fallback {
                    warn!(
                        "[{}] Fetch for {} failed ({}), serving expired copy from {}",
                        request_id, canonical, e, entry.updated_at
                    );
                    self.inner.stats.record_stale_served();
                    return Ok(FeedResponse::success(
                        requested_id,
                        entry.updated_at,
                        entry.items,
                        language_tag,
                    ));
                }
                warn!(
                    "[{}] Fetch for {} failed with nothing cached: {}",
                    request_id, canonical, e
                );
                self.inner.stats.record_error_response();
                Ok(FeedResponse::error(requested_id, language_tag, e.to_string()))
            }
        }
    }

    /// Run one refresh for a key, collapsing concurrent callers onto a
    /// single upstream fetch.
    ///
    /// The loser waits for the winner and then reads whatever the winner
    /// left in the cache; if that is nothing usable, the winner failed and
    /// the loser reports the same. Only callers that reach the adapter
    /// count toward the sync-fetch stat.
    async fn refresh_with_tracker(
        &self,
        canonical: &str,
        language_tag: &str,
        policy: FreshnessPolicy,
    ) -> Result<CacheEntry> {
        let key = cache_key(canonical, language_tag);
        let timeout = Duration::from_secs(self.inner.config.fetch_timeout_secs);

        if self.inner.cache.is_degraded() {
            // No cache to collapse onto; every caller fetches for itself.
            self.inner.stats.record_sync_fetch();
            return self.refresh_bounded(canonical, language_tag, timeout).await;
        }

        match self.inner.tracker.begin(&key) {
            Some(guard) => {
                self.inner.stats.record_sync_fetch();
                let result = self.refresh_bounded(canonical, language_tag, timeout).await;
                drop(guard);
                result
            }
            None => {
                debug!("Refresh of {} already in flight, waiting for it", key);
                if !self.inner.tracker.wait_for(&key, timeout).await {
                    self.inner.stats.record_timeout();
                    return Err(GatewayError::Timeout {
                        feed: canonical.to_string(),
                        timeout_secs: self.inner.config.fetch_timeout_secs,
                    });
                }
                match self.inner.cache.get(&key).await {
                    Some(entry)
                        if policy.classify(Some(&entry), Utc::now()) != Freshness::Expired =>
                    {
                        Ok(entry)
                    }
                    _ => Err(GatewayError::AdapterFetch {
                        feed: canonical.to_string(),
                        message: "concurrent refresh finished without a usable entry".to_string(),
                    }),
                }
            }
        }
    }

    /// One refresh bounded by the fetch timeout; hitting the bound cancels
    /// the fetch outright rather than letting it run on unobserved.
    async fn refresh_bounded(
        &self,
        canonical: &str,
        language_tag: &str,
        timeout: Duration,
    ) -> Result<CacheEntry> {
        match tokio::time::timeout(timeout, self.refresh_entry(canonical, language_tag)).await {
            Ok(result) => result,
            Err(_) => {
                self.inner.stats.record_timeout();
                Err(GatewayError::Timeout {
                    feed: canonical.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Fetch, translate if the requested language differs from the feed's
    /// native one, and store. A failed cache write is logged and ignored;
    /// the fetched items are served either way.
    async fn refresh_entry(&self, canonical: &str, language_tag: &str) -> Result<CacheEntry> {
        let registered = self.inner.registry.get(canonical).ok_or_else(|| {
            GatewayError::UnknownFeed {
                id: canonical.to_string(),
            }
        })?;
        let items = registered.adapter.fetch().await?;
        let items = if registered.spec.native_lang == language_tag {
            items
        } else {
            self.translate_items(items, &registered.spec.native_lang, language_tag)
                .await
        };

        let key = cache_key(canonical, language_tag);
        if let Err(e) = self.inner.cache.set(&key, &items).await {
            warn!("Cache write for {} failed: {}", key, e);
        }
        Ok(CacheEntry {
            key,
            updated_at: Utc::now(),
            items,
        })
    }

    /// Translate titles and descriptions in one batch, keeping the original
    /// title alongside. Unique descriptions stay in the native language.
    async fn translate_items(
        &self,
        items: Vec<FeedItem>,
        from_lang: &str,
        to_lang: &str,
    ) -> Vec<FeedItem> {
        if items.is_empty() {
            return items;
        }

        let mut texts: Vec<String> = items.iter().map(|item| item.title.clone()).collect();
        let mut description_slots: Vec<Option<usize>> = Vec::with_capacity(items.len());
        for item in &items {
            match &item.extra.description {
                Some(description) => {
                    description_slots.push(Some(texts.len()));
                    texts.push(description.clone());
                }
                None => description_slots.push(None),
            }
        }

        let translated = self
            .inner
            .translator
            .translate_batch(&texts, from_lang, to_lang)
            .await;

        let mut out = Vec::with_capacity(items.len());
        for (idx, mut item) in items.into_iter().enumerate() {
            if let Some(new_title) = translated.get(idx) {
                let original = std::mem::replace(&mut item.title, new_title.clone());
                item.extra.original_title = Some(original);
            }
            if let Some(slot) = description_slots[idx] {
                if let Some(new_description) = translated.get(slot) {
                    item.extra.description = Some(new_description.clone());
                }
            }
            item.extra.language_tag = Some(to_lang.to_string());
            out.push(item);
        }
        out
    }

    /// Kick off a background refresh unless one is already running for the
    /// same key. The task owns the tracker guard for its whole lifetime,
    /// so the slot frees up however the refresh ends.
    fn spawn_revalidate(&self, canonical: FeedId, language_tag: String) {
        let key = cache_key(&canonical, &language_tag);
        let guard = match self.inner.tracker.begin(&key) {
            Some(guard) => guard,
            None => {
                debug!("Revalidation of {} already in flight, not spawning another", key);
                return;
            }
        };
        self.inner.stats.record_background_refresh();

        let gateway = self.clone();
        let timeout = Duration::from_secs(self.inner.config.fetch_timeout_secs);
        tokio::spawn(async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, gateway.refresh_entry(&canonical, &language_tag))
                .await
            {
                Ok(Ok(entry)) => {
                    debug!(
                        "Background refresh of {} stored {} items",
                        key,
                        entry.items.len()
                    );
                }
                Ok(Err(e)) => {
                    gateway.inner.stats.record_fetch_failure();
                    warn!("Background refresh of {} failed: {}", key, e);
                }
                Err(_) => {
                    gateway.inner.stats.record_timeout();
                    warn!(
                        "Background refresh of {} timed out after {}s",
                        key,
                        timeout.as_secs()
                    );
                }
            }
        });
    }
}

/// Builder assembling a gateway from parts, with working defaults for
/// everything but the feeds themselves.
#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    translate: TranslateConfig,
    registry: AdapterRegistry,
    backend: Option<Arc<dyn TranslateBackend>>,
    guard: Option<Arc<dyn QualityCheck>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_translate_config(mut self, config: TranslateConfig) -> Self {
        self.translate = config;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn TranslateBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_quality_guard(mut self, guard: Arc<dyn QualityCheck>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn register_feed(mut self, adapter: Arc<dyn FeedAdapter>, spec: FeedSpec) -> Self {
        self.registry.register(adapter, spec);
        self
    }

    pub fn redirect(mut self, from: impl Into<FeedId>, to: impl Into<FeedId>) -> Self {
        self.registry.redirect(from, to);
        self
    }

    /// Open the cache and assemble the gateway. Never fails: a missing
    /// database degrades the cache, and a missing backend falls back to
    /// the in-process mock.
    pub async fn build(self) -> FeedGateway {
        let cache = CacheStore::connect(&self.config).await;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MockTranslateBackend::new()));
        let mut translator = BatchTranslator::new(backend, self.translate);
        if let Some(guard) = self.guard {
            translator = translator.with_guard(guard);
        }
        info!("Feed gateway ready with {} feeds registered", self.registry.len());
        FeedGateway {
            inner: Arc::new(GatewayInner {
                registry: self.registry,
                cache,
                translator,
                tracker: Arc::new(RefreshTracker::new()),
                config: self.config,
                stats: GatewayStats::default(),
            }),
        }
    }
}
