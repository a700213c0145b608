//! SQLite-backed cache of translated feed items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::types::{CacheEntry, FeedItem, GatewayError, Result};

/// Current on-disk payload format. Bump when the envelope shape changes and
/// teach `StoredPayload` to read the old one.
const PAYLOAD_VERSION: u32 = 1;

#[derive(Serialize)]
struct VersionedPayload<'a> {
    version: u32,
    items: &'a [FeedItem],
}

/// Every payload shape ever written, newest first. Entries written before
/// the envelope existed are a bare item array or `{"items": [...]}`; they
/// are upgraded to the versioned shape on their next write.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPayload {
    Versioned {
        #[allow(dead_code)]
        version: u32,
        items: Vec<FeedItem>,
    },
    Wrapped {
        items: Vec<FeedItem>,
    },
    Bare(Vec<FeedItem>),
}

impl StoredPayload {
    fn into_items(self) -> Vec<FeedItem> {
        match self {
            StoredPayload::Versioned { items, .. } => items,
            StoredPayload::Wrapped { items } => items,
            StoredPayload::Bare(items) => items,
        }
    }
}

/// Cache store over a SQLite pool.
///
/// The store never takes the gateway down: when the database cannot be
/// opened it runs degraded, reads miss and writes are dropped, and the
/// gateway falls back to fetching on every request.
pub struct CacheStore {
    pool: Option<SqlitePool>,
}

impl CacheStore {
    /// Open the store. Infallible: any connection or schema problem leaves
    /// the store degraded instead of failing startup.
    pub async fn connect(config: &GatewayConfig) -> Self {
        if !config.cache_enabled {
            info!("Cache disabled by configuration, running in pass-through mode");
            return Self { pool: None };
        }
        match open_pool(&config.database_url).await {
            Ok(pool) => {
                if config.cache_schema_init {
                    if let Err(e) = init_schema(&pool).await {
                        warn!("Cache schema init failed, continuing without cache: {}", e);
                        return Self { pool: None };
                    }
                }
                debug!("Cache store connected to {}", config.database_url);
                Self { pool: Some(pool) }
            }
            Err(e) => {
                warn!("Cache unavailable, continuing without cache: {}", e);
                Self { pool: None }
            }
        }
    }

    /// True when the store has no working database behind it.
    pub fn is_degraded(&self) -> bool {
        self.pool.is_none()
    }

    pub fn pool(&self) -> Option<&SqlitePool> {
        self.pool.as_ref()
    }

    /// Look up one entry. Read failures and undecodable payloads count as
    /// misses so a bad row can never break serving.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let pool = self.pool.as_ref()?;
        let row = match sqlx::query("SELECT updated_at, payload FROM feed_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await
        {
            Ok(row) => row?,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };
        decode_row(key, &row)
    }

    /// Look up several keys at once; absent, unreadable, and failed keys
    /// are simply missing from the result.
    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, CacheEntry> {
        let mut found = HashMap::new();
        if self.pool.is_none() {
            return found;
        }
        for key in keys {
            if found.contains_key(key) {
                continue;
            }
            if let Some(entry) = self.get(key).await {
                found.insert(key.clone(), entry);
            }
        }
        found
    }

    /// Store items under a key, stamping the entry with the current time.
    pub async fn set(&self, key: &str, items: &[FeedItem]) -> Result<()> {
        let pool = match &self.pool {
            Some(pool) => pool,
            None => {
                debug!("Cache degraded, dropping write for {}", key);
                return Ok(());
            }
        };
        let payload = serde_json::to_string(&VersionedPayload {
            version: PAYLOAD_VERSION,
            items,
        })?;
        sqlx::query(
            "INSERT INTO feed_cache (key, updated_at, payload) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at, payload = excluded.payload",
        )
        .bind(key)
        .bind(Utc::now().timestamp_millis())
        .bind(&payload)
        .execute(pool)
        .await?;
        debug!("Cached {} items under {}", items.len(), key);
        Ok(())
    }

    /// Remove one entry; removing an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let pool = match &self.pool {
            Some(pool) => pool,
            None => {
                debug!("Cache degraded, ignoring delete for {}", key);
                return Ok(());
            }
        };
        sqlx::query("DELETE FROM feed_cache WHERE key = ?")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Drop every cached entry.
    pub async fn delete_all(&self) -> Result<()> {
        let pool = match &self.pool {
            Some(pool) => pool,
            None => return Ok(()),
        };
        let result = sqlx::query("DELETE FROM feed_cache").execute(pool).await?;
        info!("Cleared {} cache entries", result.rows_affected());
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        let pool = match &self.pool {
            Some(pool) => pool,
            None => return Ok(Vec::new()),
        };
        let keys = sqlx::query_scalar("SELECT key FROM feed_cache ORDER BY key")
            .fetch_all(pool)
            .await?;
        Ok(keys)
    }

    pub async fn stats(&self) -> HashMap<String, i64> {
        let mut stats = HashMap::new();
        let pool = match &self.pool {
            Some(pool) => pool,
            None => {
                stats.insert("available".to_string(), 0);
                return stats;
            }
        };
        stats.insert("available".to_string(), 1);
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM feed_cache")
            .fetch_one(pool)
            .await
        {
            Ok(count) => {
                stats.insert("entries".to_string(), count);
            }
            Err(e) => warn!("Cache stats query failed: {}", e),
        }
        stats
    }
}

async fn open_pool(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    // Every new connection to an in-memory SQLite database gets its own
    // empty database, so those pools must stay at one connection.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS feed_cache (
            key TEXT PRIMARY KEY,
            updated_at INTEGER NOT NULL,
            payload TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn decode_row(key: &str, row: &SqliteRow) -> Option<CacheEntry> {
    let decoded = (|| -> Result<CacheEntry> {
        let updated_at_ms: i64 = row.try_get("updated_at")?;
        let payload: String = row.try_get("payload")?;
        let updated_at = DateTime::<Utc>::from_timestamp_millis(updated_at_ms)
            .ok_or_else(|| GatewayError::General(format!("invalid timestamp {}", updated_at_ms)))?;
        let stored: StoredPayload = serde_json::from_str(&payload)?;
        if !matches!(stored, StoredPayload::Versioned { .. }) {
            debug!("Migrating legacy cache payload for {}", key);
        }
        Ok(CacheEntry {
            key: key.to_string(),
            updated_at,
            items: stored.into_items(),
        })
    })();
    match decoded {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Discarding unreadable cache entry {}: {}", key, e);
            None
        }
    }
}
