//! Comparable-sale matching.
//!
//! Queries the price-lookup collaborator for historical sales of a card
//! identity, scores each candidate against the target via fuzzy text
//! similarity, discards weak matches, and groups the survivors by
//! condition bucket. Results are cached per (identity, window) with a
//! TTL; concurrent evaluations of the same identity share one lookup
//! instead of issuing duplicates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{MatcherConfig, RetryConfig};
use crate::lookup::{PriceLookup, RawSaleRecord};
use crate::retry::with_retry;
use crate::types::{CardIdentity, ComparableSample, ConditionBucket, EngineError};

/// Comparable samples grouped by condition bucket.
pub type CompsByBucket = BTreeMap<ConditionBucket, Vec<ComparableSample>>;

// ---------------------------------------------------------------------------
// Text similarity
// ---------------------------------------------------------------------------

/// Bonus when the candidate title carries the exact set code.
const SET_CODE_BONUS: f64 = 0.15;

/// Compute a normalised similarity score between two identity strings.
///
/// Uses a combination of:
/// 1. Word overlap (Jaccard index on normalised tokens)
/// 2. Substring containment bonus
///
/// Returns 0.0 (no similarity) to 1.0 (identical after normalisation).
fn text_similarity(a: &str, b: &str) -> f64 {
    let norm = |s: &str| -> Vec<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2) // drop short words like "a", "of"
            .map(String::from)
            .collect()
    };

    let words_a = norm(a);
    let words_b = norm(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let set_a: std::collections::HashSet<&str> = words_a.iter().map(|s| s.as_str()).collect();
    let set_b: std::collections::HashSet<&str> = words_b.iter().map(|s| s.as_str()).collect();

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;

    let jaccard = if union > 0.0 { intersection / union } else { 0.0 };

    // Containment handles asymmetric lengths: a terse query against a
    // long marketplace title.
    let containment = intersection / set_a.len().min(set_b.len()) as f64;

    (0.6 * jaccard + 0.4 * containment).min(1.0)
}

/// Similarity of a candidate sale title to the target identity, with a
/// bonus when the candidate names the same set code.
pub fn identity_similarity(query: &CardIdentity, candidate_title: &str) -> f64 {
    let score = text_similarity(&query.normalized(), candidate_title);

    let bonus = query.set_code.as_deref().map_or(0.0, |set| {
        let set = set.trim().to_lowercase();
        if !set.is_empty() && candidate_title.to_lowercase().contains(&set) {
            SET_CODE_BONUS
        } else {
            0.0
        }
    });

    (score + bonus).min(1.0)
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identity: String,
    window_days: u32,
}

struct CacheEntry {
    comps: CompsByBucket,
    inserted_at: DateTime<Utc>,
}

/// TTL cache for grouped comparables, with per-key in-flight guards so
/// that concurrent misses on the same key collapse into one fetch.
struct CompsCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    flights: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CompsCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<CompsByBucket> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if Utc::now() - entry.inserted_at < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.comps.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn insert(&self, key: CacheKey, comps: CompsByBucket) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            CacheEntry {
                comps,
                inserted_at: Utc::now(),
            },
        );
    }

    /// Per-key guard serialising concurrent fetches of the same key.
    async fn flight_guard(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights.entry(key.clone()).or_default().clone()
    }

    /// Remove expired entries and guards no fetch is holding.
    async fn evict_expired(&self) {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| now - entry.inserted_at < self.ttl);

        let mut flights = self.flights.lock().await;
        flights.retain(|_, guard| Arc::strong_count(guard) > 1);
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

pub struct ComparableMatcher {
    lookup: Arc<dyn PriceLookup>,
    cache: CompsCache,
    config: MatcherConfig,
    retry: RetryConfig,
    timeout: std::time::Duration,
}

impl ComparableMatcher {
    pub fn new(
        lookup: Arc<dyn PriceLookup>,
        config: MatcherConfig,
        retry: RetryConfig,
        timeout: std::time::Duration,
    ) -> Self {
        let cache = CompsCache::new(Duration::minutes(config.cache_ttl_minutes));
        Self {
            lookup,
            cache,
            config,
            retry,
            timeout,
        }
    }

    /// Comparable sales for an identity, grouped by condition bucket.
    ///
    /// Never fails: an unreachable or empty source yields an empty map,
    /// which downstream reads as "no data". Successful fetches (empty
    /// included) are cached; failures are not, so the next evaluation
    /// retries the source.
    pub async fn comparables(&self, identity: &CardIdentity) -> CompsByBucket {
        let key = CacheKey {
            identity: identity.normalized(),
            window_days: self.config.window_days,
        };

        if let Some(cached) = self.cache.get(&key).await {
            debug!(identity = %identity, "comparables cache hit");
            return cached;
        }

        // Single flight: concurrent misses on this key queue here, and
        // all but the winner are served from cache on the re-check.
        let guard = self.cache.flight_guard(&key).await;
        let _flight = guard.lock().await;

        if let Some(cached) = self.cache.get(&key).await {
            debug!(identity = %identity, "comparables cache hit after flight");
            return cached;
        }

        match self.fetch_comps(identity).await {
            Ok(comps) => {
                self.cache.insert(key, comps.clone()).await;
                comps
            }
            Err(err) => {
                warn!(
                    identity = %identity,
                    source = self.lookup.name(),
                    error = %err,
                    "comparable lookup unavailable, continuing without data",
                );
                CompsByBucket::new()
            }
        }
    }

    async fn fetch_comps(&self, identity: &CardIdentity) -> Result<CompsByBucket, EngineError> {
        let records = with_retry(&self.retry, self.timeout, "comparable lookup", || {
            self.lookup.search_sales(identity, self.config.window_days)
        })
        .await?;

        Ok(self.group_records(identity, records))
    }

    /// Similarity-filter raw records and group the survivors by bucket.
    fn group_records(&self, identity: &CardIdentity, records: Vec<RawSaleRecord>) -> CompsByBucket {
        let candidates = records.len();
        let mut comps = CompsByBucket::new();

        for record in records {
            let similarity = identity_similarity(identity, &record.title);
            if similarity < self.config.similarity_floor {
                debug!(
                    title = %record.title,
                    similarity,
                    floor = self.config.similarity_floor,
                    "candidate below similarity floor",
                );
                continue;
            }

            let bucket = ConditionBucket::from_condition_text(&record.condition_text);
            comps.entry(bucket).or_default().push(ComparableSample {
                price: record.price,
                currency: record.currency,
                bucket,
                sold_at: record.sold_at,
                source_id: record.source_id,
                source_title: record.title,
                similarity,
            });
        }

        let kept: usize = comps.values().map(Vec::len).sum();
        debug!(
            identity = %identity,
            candidates,
            kept,
            buckets = comps.len(),
            "comparables grouped",
        );
        comps
    }

    /// Drop expired cache entries. Called once per run.
    pub async fn evict_expired(&self) {
        self.cache.evict_expired().await;
    }

    // -- Accessors for monitoring ----------------------------------------

    pub fn cache_hits(&self) -> u64 {
        self.cache.hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache.misses.load(Ordering::Relaxed)
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
