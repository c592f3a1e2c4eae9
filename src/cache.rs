//! Two-tier (in-memory + persistent) cache with TTL routing by data-type
//! prefix and market-hours-aware TTL selection. Ported semantics from
//! `original_source/services/cache.py`; storage shape generalized from the
//! teacher's `CachedStore` (local cache + fallback store).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use dashmap::DashMap;
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::CacheConfig;
use crate::error::CacheError;

pub const TTL_OHLCV_PERMANENT: u64 = 0;
pub const TTL_OPTION_CHAIN_MARKET: u64 = 300;
pub const TTL_OPTION_CHAIN_AFTER: u64 = 3600;
pub const TTL_INTRADAY_QUOTE_MARKET: u64 = 60;
pub const TTL_INTRADAY_QUOTE_AFTER: u64 = 300;
pub const TTL_IV_RANK: u64 = 3600;
pub const TTL_FUNDAMENTALS: u64 = 86400;
pub const TTL_EARNINGS: u64 = 86400;
pub const TTL_FAILURE: u64 = 86400;
const TTL_UNKNOWN_FALLBACK: u64 = 300;

const PERSISTENT_DATA_TYPES: &[&str] = &[
    "ohlcv",
    "iv_rank",
    "iv_percentile",
    "fundamentals",
    "earnings",
    "failure",
];

/// A stored cache entry. `ttl_seconds == 0` means "never expires".
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_seconds == 0 {
            return false;
        }
        (now - self.created_at).num_seconds() >= self.ttl_seconds as i64
    }
}

/// Returns true on weekdays between 09:30 and 16:00 America/New_York. No
/// holiday calendar, matching the original.
pub fn is_market_hours(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&New_York);
    if local.weekday().num_days_from_monday() >= 5 {
        return false;
    }
    let minutes_since_midnight = local.hour() * 60 + local.minute();
    let open = 9 * 60 + 30;
    let close = 16 * 60;
    minutes_since_midnight >= open && minutes_since_midnight < close
}

/// Returns the TTL (in seconds) for a given data-type, routed by whether
/// the market is currently open.
pub fn get_ttl(data_type: &str, now: DateTime<Utc>) -> u64 {
    let market_open = is_market_hours(now);
    match data_type {
        "ohlcv" => TTL_OHLCV_PERMANENT,
        "chain" => {
            if market_open {
                TTL_OPTION_CHAIN_MARKET
            } else {
                TTL_OPTION_CHAIN_AFTER
            }
        }
        "quote" => {
            if market_open {
                TTL_INTRADAY_QUOTE_MARKET
            } else {
                TTL_INTRADAY_QUOTE_AFTER
            }
        }
        "iv_rank" | "iv_percentile" => TTL_IV_RANK,
        "fundamentals" => TTL_FUNDAMENTALS,
        "earnings" => TTL_EARNINGS,
        "failure" => TTL_FAILURE,
        other => {
            warn!(data_type = other, "unknown cache data_type, defaulting TTL to 300s");
            TTL_UNKNOWN_FALLBACK
        }
    }
}

fn data_type_of(key: &str) -> Option<&str> {
    key.split(':').nth(1)
}

fn should_use_persistent(key: &str) -> bool {
    data_type_of(key).is_some_and(|dt| PERSISTENT_DATA_TYPES.contains(&dt))
}

/// In-memory + persistent two-tier cache. All SQLite access is serialized
/// behind a single mutex-guarded connection, matching the "one writer"
/// resource model.
pub struct ServiceCache {
    memory: DashMap<String, CacheEntry>,
    persistent: Option<Mutex<Connection>>,
    lazy_cleanup_interval: u32,
    access_count: AtomicU64,
}

impl ServiceCache {
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let persistent = match &config.database_path {
            Some(path) => {
                let conn = Connection::open(path).map_err(|e| CacheError::Persistence(e.to_string()))?;
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS service_cache (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        ttl_seconds INTEGER NOT NULL
                    )",
                    [],
                )
                .map_err(|e| CacheError::Persistence(e.to_string()))?;
                Some(Mutex::new(conn))
            }
            None => None,
        };
        Ok(Self {
            memory: DashMap::new(),
            persistent,
            lazy_cleanup_interval: config.lazy_cleanup_interval,
            access_count: AtomicU64::new(0),
        })
    }

    fn bump_access_and_maybe_evict(&self) {
        let count = self.access_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % u64::from(self.lazy_cleanup_interval) == 0 {
            self.evict_expired_memory_entries();
        }
    }

    fn evict_expired_memory_entries(&self) {
        let now = Utc::now();
        self.memory.retain(|_, entry| !entry.is_expired(now));
    }

    pub async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.bump_access_and_maybe_evict();
        let now = Utc::now();

        if should_use_persistent(key) {
            if let Some(conn) = &self.persistent {
                let conn = conn.lock().await;
                let row: Option<(String, String, i64)> = conn
                    .query_row(
                        "SELECT value, created_at, ttl_seconds FROM service_cache WHERE key = ?1",
                        [key],
                        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                    )
                    .ok();
                if let Some((value, created_at, ttl_seconds)) = row {
                    let created_at: DateTime<Utc> = created_at.parse().ok()?;
                    let entry = CacheEntry {
                        value: value.into_bytes(),
                        created_at,
                        ttl_seconds: ttl_seconds as u64,
                    };
                    if entry.is_expired(now) {
                        let _ = conn.execute("DELETE FROM service_cache WHERE key = ?1", [key]);
                        return None;
                    }
                    return Some(entry.value);
                }
                return None;
            }
        }

        match self.memory.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn set_raw(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError> {
        let now = Utc::now();
        let entry = CacheEntry {
            value: value.clone(),
            created_at: now,
            ttl_seconds,
        };

        if should_use_persistent(key) {
            if let Some(conn) = &self.persistent {
                let conn = conn.lock().await;
                let value_str = String::from_utf8(value)
                    .map_err(|e| CacheError::Codec(key.to_string(), e.to_string()))?;
                conn.execute(
                    "INSERT INTO service_cache (key, value, created_at, ttl_seconds)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET value=excluded.value, created_at=excluded.created_at, ttl_seconds=excluded.ttl_seconds",
                    rusqlite::params![key, value_str, now.to_rfc3339(), ttl_seconds as i64],
                )
                .map_err(|e| CacheError::Persistence(e.to_string()))?;
                return Ok(());
            }
        }

        self.memory.insert(key.to_string(), entry);
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        serde_json::from_slice(&raw).ok()
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_vec(value).map_err(|e| CacheError::Codec(key.to_string(), e.to_string()))?;
        self.set_raw(key, raw, ttl_seconds).await
    }

    pub async fn invalidate(&self, key: &str) {
        self.memory.remove(key);
        if let Some(conn) = &self.persistent {
            let conn = conn.lock().await;
            let _ = conn.execute("DELETE FROM service_cache WHERE key = ?1", [key]);
        }
    }

    /// Accepts a suffix wildcard `"prefix*"`; removes all matching keys from
    /// both tiers.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        let prefix = pattern.trim_end_matches('*');
        self.memory.retain(|k, _| !k.starts_with(prefix));
        if let Some(conn) = &self.persistent {
            let conn = conn.lock().await;
            let like_pattern = format!("{prefix}%");
            let _ = conn.execute(
                "DELETE FROM service_cache WHERE key LIKE ?1",
                [like_pattern],
            );
        }
    }
}

/// `<source>:<data_type>:<rest>` key builder, matching the original's
/// colon-delimited scheme.
pub fn build_key(source: &str, data_type: &str, rest: &str) -> String {
    format!("{source}:{data_type}:{rest}")
}

pub fn default_ttl_for_key(key: &str) -> u64 {
    let data_type = data_type_of(key).unwrap_or("unknown");
    get_ttl(data_type, Utc::now())
}

pub type SharedCache = Arc<ServiceCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn memory_only_config() -> CacheConfig {
        CacheConfig {
            database_path: None,
            lazy_cleanup_interval: 100,
        }
    }

    #[test]
    fn market_hours_false_on_weekend() {
        // Saturday 2024-06-01 noon UTC.
        let saturday = Utc.with_ymd_and_hms(2024, 6, 1, 16, 0, 0).unwrap();
        assert!(!is_market_hours(saturday));
        let sunday = Utc.with_ymd_and_hms(2024, 6, 2, 16, 0, 0).unwrap();
        assert!(!is_market_hours(sunday));
    }

    #[test]
    fn market_hours_true_during_session() {
        // Wednesday 2024-06-05, 14:00 UTC == 10:00 America/New_York (EDT, UTC-4).
        let midday = Utc.with_ymd_and_hms(2024, 6, 5, 14, 0, 0).unwrap();
        assert!(is_market_hours(midday));
    }

    #[test]
    fn ttl_ohlcv_is_always_permanent() {
        let now = Utc::now();
        assert_eq!(get_ttl("ohlcv", now), 0);
    }

    #[tokio::test]
    async fn set_then_get_within_ttl_returns_value() {
        let cache = ServiceCache::new(&memory_only_config()).unwrap();
        cache
            .set_raw("yf:quote:AAPL", b"hello".to_vec(), 60)
            .await
            .unwrap();
        let got = cache.get_raw("yf:quote:AAPL").await;
        assert_eq!(got, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_returns_none() {
        let cache = ServiceCache::new(&memory_only_config()).unwrap();
        cache
            .set_raw("yf:quote:AAPL", b"hello".to_vec(), 0)
            .await
            .unwrap();
        // ttl_seconds = 0 means never expires; force expiry via direct manipulation.
        cache.memory.alter("yf:quote:AAPL", |_, mut entry| {
            entry.ttl_seconds = 1;
            entry.created_at = Utc::now() - chrono::Duration::seconds(10);
            entry
        });
        assert_eq!(cache.get_raw("yf:quote:AAPL").await, None);
    }

    #[tokio::test]
    async fn pattern_invalidation_removes_matching_keys() {
        let cache = ServiceCache::new(&memory_only_config()).unwrap();
        cache.set_raw("yf:quote:AAPL", b"1".to_vec(), 60).await.unwrap();
        cache.set_raw("yf:quote:MSFT", b"2".to_vec(), 60).await.unwrap();
        cache.set_raw("yf:ohlcv:AAPL", b"3".to_vec(), 0).await.unwrap();
        cache.invalidate_pattern("yf:quote:*").await;
        assert_eq!(cache.get_raw("yf:quote:AAPL").await, None);
        assert_eq!(cache.get_raw("yf:quote:MSFT").await, None);
        assert_eq!(cache.get_raw("yf:ohlcv:AAPL").await, Some(b"3".to_vec()));
    }
}
