use chrono::{DateTime, Utc};

use crate::types::CacheEntry;

/// Age classification of a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the feed's refresh interval: current by definition.
    Fresh,
    /// Past the refresh interval but inside the hard TTL: may be served,
    /// should be revalidated.
    StaleUsable,
    /// Past the hard TTL, or absent: must not be served without a fetch.
    Expired,
}

/// What the orchestrator should do for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServePlan {
    ServeCached,
    /// Serve the cached items now and refresh them in the background.
    ServeCachedRevalidate,
    /// Fetch before responding; there is nothing servable.
    FetchSync,
}

/// Per-feed refresh interval paired with the gateway-wide TTL bound.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    pub refresh_interval_secs: u64,
    pub ttl_secs: u64,
}

impl FreshnessPolicy {
    pub fn new(refresh_interval_secs: u64, ttl_secs: u64) -> Self {
        Self {
            refresh_interval_secs,
            ttl_secs,
        }
    }

    /// Classify an entry by its age at `now`.
    ///
    /// The TTL wins over the refresh interval when the two disagree, so a
    /// misconfigured interval can never stretch the hard bound. An entry
    /// stamped in the future counts as age zero.
    pub fn classify(&self, entry: Option<&CacheEntry>, now: DateTime<Utc>) -> Freshness {
        let entry = match entry {
            Some(entry) => entry,
            None => return Freshness::Expired,
        };
        let age_secs = (now - entry.updated_at).num_seconds().max(0) as u64;
        if age_secs >= self.ttl_secs {
            Freshness::Expired
        } else if age_secs < self.refresh_interval_secs {
            Freshness::Fresh
        } else {
            Freshness::StaleUsable
        }
    }

    /// Decide how to serve a request given the entry's age.
    ///
    /// A stale entry is always served from cache; `wants_latest` decides
    /// whether a background revalidation is scheduled alongside the
    /// response. Only an expired or absent entry forces a synchronous
    /// fetch.
    pub fn plan(
        &self,
        entry: Option<&CacheEntry>,
        now: DateTime<Utc>,
        wants_latest: bool,
    ) -> ServePlan {
        Self::plan_for(self.classify(entry, now), wants_latest)
    }

    /// The decision table behind [`FreshnessPolicy::plan`], usable when the
    /// classification is already at hand.
    pub fn plan_for(freshness: Freshness, wants_latest: bool) -> ServePlan {
        match freshness {
            Freshness::Fresh => ServePlan::ServeCached,
            Freshness::StaleUsable if wants_latest => ServePlan::ServeCachedRevalidate,
            Freshness::StaleUsable => ServePlan::ServeCached,
            Freshness::Expired => ServePlan::FetchSync,
        }
    }
}
