use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FeedSpec;
use crate::types::{FeedId, FeedItem, GatewayError, Result};

/// Longest redirect chain the registry will follow before giving up.
const MAX_REDIRECT_DEPTH: usize = 4;

/// Source of items for one feed, in the feed's native language.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Canonical id of the feed this adapter serves.
    fn feed_id(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<FeedItem>>;
}

/// One registered feed: its adapter and its static configuration.
pub struct RegisteredFeed {
    pub adapter: Arc<dyn FeedAdapter>,
    pub spec: FeedSpec,
}

/// Registry mapping feed ids to adapters, with alias redirection.
///
/// A redirect points a retired or renamed id at another id; chains are
/// followed up to a small fixed depth, so a cycle resolves to unknown
/// instead of spinning.
#[derive(Default)]
pub struct AdapterRegistry {
    feeds: HashMap<FeedId, RegisteredFeed>,
    redirects: HashMap<FeedId, FeedId>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own feed id, replacing any previous
    /// registration for that id.
    pub fn register(&mut self, adapter: Arc<dyn FeedAdapter>, spec: FeedSpec) {
        let id = adapter.feed_id().to_string();
        info!(
            "Registered feed {} (native {}, refresh every {}s)",
            id, spec.native_lang, spec.refresh_interval_secs
        );
        if self.feeds.insert(id.clone(), RegisteredFeed { adapter, spec }).is_some() {
            warn!("Replaced existing adapter for feed {}", id);
        }
    }

    /// Point requests for `from` at `to`.
    pub fn redirect(&mut self, from: impl Into<FeedId>, to: impl Into<FeedId>) {
        let (from, to) = (from.into(), to.into());
        info!("Feed id {} now redirects to {}", from, to);
        self.redirects.insert(from, to);
    }

    /// Follow redirects from a requested id to the canonical feed id.
    pub fn resolve_id(&self, id: &str) -> Result<FeedId> {
        let mut current = id.to_string();
        for _ in 0..=MAX_REDIRECT_DEPTH {
            if let Some(target) = self.redirects.get(&current) {
                current = target.clone();
                continue;
            }
            if self.feeds.contains_key(&current) {
                return Ok(current);
            }
            return Err(GatewayError::UnknownFeed { id: id.to_string() });
        }
        warn!(
            "Redirect chain from {} did not settle within {} hops",
            id, MAX_REDIRECT_DEPTH
        );
        Err(GatewayError::UnknownFeed { id: id.to_string() })
    }

    pub fn get(&self, canonical_id: &str) -> Option<&RegisteredFeed> {
        self.feeds.get(canonical_id)
    }

    /// Canonical feed ids, sorted for stable iteration.
    pub fn feed_ids(&self) -> Vec<FeedId> {
        let mut ids: Vec<FeedId> = self.feeds.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

/// Adapter serving a fixed item list, for tests and offline runs.
///
/// Supports injected latency and failures so orchestration paths can be
/// exercised without a network.
pub struct StaticFeedAdapter {
    id: FeedId,
    items: Vec<FeedItem>,
    delay_ms: u64,
    fail_first: u32,
    fail_from: Option<u32>,
    calls: AtomicUsize,
}

impl StaticFeedAdapter {
    pub fn new(id: impl Into<FeedId>, items: Vec<FeedItem>) -> Self {
        Self {
            id: id.into(),
            items,
            delay_ms: 0,
            fail_first: 0,
            fail_from: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay every fetch, to simulate a slow upstream.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Fail the first `n` fetches.
    pub fn fail_times(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Succeed for the first `n` fetches, then fail every one after.
    pub fn fail_from(mut self, n: u32) -> Self {
        self.fail_from = Some(n);
        self
    }

    /// Number of fetches attempted against this adapter.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedAdapter for StaticFeedAdapter {
    fn feed_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst) as u32;
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let inject = call_index < self.fail_first
            || self.fail_from.map_or(false, |from| call_index >= from);
        if inject {
            return Err(GatewayError::AdapterFetch {
                feed: self.id.clone(),
                message: "injected fetch failure".to_string(),
            });
        }
        Ok(self.items.clone())
    }
}
