//! Fan-out across many feeds with per-feed isolation.

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::freshness::{Freshness, FreshnessPolicy};
use crate::resolver::FeedGateway;
use crate::types::{cache_key, FeedId, FeedResponse};

impl FeedGateway {
    /// Resolve many feeds at once, returning one response per requested id
    /// in request order.
    ///
    /// Never fails as a whole: an unknown id, a failed fetch, or a timed
    /// out feed produces an error response in its slot while the others
    /// proceed. All feeds are awaited, so the wall clock is bounded by the
    /// slowest single feed rather than the sum.
    pub async fn resolve_many(&self, feed_ids: &[FeedId], language_tag: &str) -> Vec<FeedResponse> {
        if feed_ids.is_empty() {
            return Vec::new();
        }
        let request_id = Uuid::new_v4();
        info!(
            "[{}] Fan-out across {} feeds ({})",
            request_id,
            feed_ids.len(),
            language_tag
        );

        let mut slots: Vec<Option<FeedResponse>> = vec![None; feed_ids.len()];

        // Unknown ids are settled up front; everything else carries its
        // canonical id into the cache phase.
        let mut known: Vec<(usize, FeedId)> = Vec::with_capacity(feed_ids.len());
        for (idx, id) in feed_ids.iter().enumerate() {
            match self.inner.registry.resolve_id(id) {
                Ok(canonical) => known.push((idx, canonical)),
                Err(e) => {
                    self.inner.stats.record_request();
                    self.inner.stats.record_error_response();
                    warn!("[{}] {}", request_id, e);
                    slots[idx] = Some(FeedResponse::error(id.clone(), language_tag, e.to_string()));
                }
            }
        }

        // Phase one: a single batch cache read answers every fresh feed
        // without waking an adapter.
        let keys: Vec<String> = known
            .iter()
            .map(|(_, canonical)| cache_key(canonical, language_tag))
            .collect();
        let cached = self.inner.cache.get_many(&keys).await;
        let now = Utc::now();
        let mut pending: Vec<usize> = Vec::new();
        for (idx, canonical) in known {
            let refresh_interval_secs = match self.inner.registry.get(&canonical) {
                Some(registered) => registered.spec.refresh_interval_secs,
                None => 0,
            };
            let policy =
                FreshnessPolicy::new(refresh_interval_secs, self.inner.config.cache_ttl_secs);
            let key = cache_key(&canonical, language_tag);
            match cached.get(&key) {
                Some(entry) if policy.classify(Some(entry), now) == Freshness::Fresh => {
                    self.inner.stats.record_request();
                    self.inner.stats.record_cache_hit();
                    slots[idx] = Some(FeedResponse::success(
                        feed_ids[idx].clone(),
                        entry.updated_at,
                        entry.items.clone(),
                        language_tag,
                    ));
                }
                _ => pending.push(idx),
            }
        }

        // Phase two: the rest go through the full per-feed path
        // concurrently, each bounded by its own fetch timeout.
        if !pending.is_empty() {
            debug!(
                "[{}] {} of {} feeds need fetching",
                request_id,
                pending.len(),
                feed_ids.len()
            );
            let pending_futures = pending.iter().map(|idx| {
                let requested = feed_ids[*idx].clone();
                async move {
                    match self.resolve(&requested, language_tag, false).await {
                        Ok(response) => response,
                        Err(e) => {
                            self.inner.stats.record_error_response();
                            FeedResponse::error(requested, language_tag, e.to_string())
                        }
                    }
                }
            });
            let responses = join_all(pending_futures).await;
            for (idx, response) in pending.into_iter().zip(responses) {
                slots[idx] = Some(response);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    FeedResponse::error(
                        feed_ids[idx].clone(),
                        language_tag,
                        "request slot was never resolved",
                    )
                })
            })
            .collect()
    }
}
