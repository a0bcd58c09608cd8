//! Mode-aware response cache with exact and semantic lookup.
//!
//! Caches speculative responses under a stable fingerprint of
//! `query:top_k`, with an optional embedding-based semantic index for
//! near-duplicate queries. Entries are TTL-bounded and evicted LRU in
//! 10% batches. The cache is an optimization, never a source of
//! correctness: every failure degrades to a miss (get) or a drop (set).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::embedding::{Embedder, cosine_similarity};
use crate::model::SpeculativeResponse;

/// Response text markers that disqualify an entry from caching.
///
/// These are failure or placeholder renderings; caching them would pin
/// a bad answer for the TTL window.
const FAILURE_MARKERS: &[&str] = &[
    "no response generated",
    "unable to generate",
    "processing your query",
    "please wait for detailed results",
    "an error occurred",
    "unable to process",
    "no relevant documents found",
    "performing deeper search",
    "try again",
    "contact support",
];

/// Minimum confidence for an entry to be cacheable.
const MIN_CACHEABLE_CONFIDENCE: f32 = 0.3;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry time-to-live.
    pub ttl: Duration,
    /// Maximum entries before LRU eviction kicks in.
    pub max_entries: usize,
    /// Similarity at or above which a semantic match counts as
    /// exact-equivalent.
    pub exact_semantic_threshold: f32,
    /// Minimum similarity for a semantic ("near") hit.
    pub near_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            exact_semantic_threshold: 0.95,
            near_threshold: 0.85,
        }
    }
}

/// How a cache hit matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMatch {
    /// Exact fingerprint match.
    Exact,
    /// Embedding-similarity match.
    Semantic,
}

impl CacheMatch {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Semantic => "semantic",
        }
    }
}

/// A successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The stored response, with `cache_hit` set.
    pub response: SpeculativeResponse,
    /// How the entry matched.
    pub match_type: CacheMatch,
    /// Similarity of the match (1.0 for exact).
    pub similarity: f32,
}

struct CacheEntry {
    response: SpeculativeResponse,
    embedding: Option<Vec<f32>>,
    inserted_at: Instant,
    last_access: Instant,
}

/// Returns `true` if a response may be cached or served from cache.
///
/// Requires non-empty text free of failure markers, confidence at or
/// above 0.3, and at least one source.
#[must_use]
pub fn is_valid_response(response: &SpeculativeResponse) -> bool {
    if response.text.trim().is_empty() {
        return false;
    }

    let lower = response.text.to_lowercase();
    if FAILURE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return false;
    }

    if response.confidence < MIN_CACHEABLE_CONFIDENCE {
        return false;
    }

    !response.sources.is_empty()
}

/// Speculative response cache with exact and semantic lookup.
///
/// Safe under concurrent `get`/`set`; lookups and insertions take a
/// single internal lock (embeddings are computed outside it).
pub struct SpeculativeCache {
    config: CacheConfig,
    embedder: Option<std::sync::Arc<dyn Embedder>>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SpeculativeCache {
    /// Creates a cache without a semantic index (exact lookup only).
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            embedder: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache with an embedding-backed semantic index.
    #[must_use]
    pub fn with_semantic_index(
        config: CacheConfig,
        embedder: std::sync::Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config,
            embedder: Some(embedder),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Derives the exact-lookup fingerprint for a query.
    #[must_use]
    pub fn fingerprint(query: &str, top_k: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update(b":");
        hasher.update(top_k.to_string().as_bytes());
        let digest = hasher.finalize();
        // 16 hex chars is plenty of key space for a bounded cache
        digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
    }

    /// Looks up a cached response for the query.
    ///
    /// Tries the exact fingerprint first, then the semantic index when
    /// one is configured. Expired or invalid entries found along the
    /// way are removed and reported as a miss.
    pub async fn get(&self, query: &str, top_k: usize) -> Option<CacheHit> {
        let key = Self::fingerprint(query, top_k);

        if let Some(hit) = self.get_exact(&key) {
            info!(key = %key, "cache hit (exact)");
            return Some(hit);
        }

        let hit = self.get_semantic(query).await;
        if let Some(ref h) = hit {
            info!(similarity = h.similarity, "cache hit (semantic)");
        } else {
            debug!(key = %key, "cache miss");
        }
        hit
    }

    fn get_exact(&self, key: &str) -> Option<CacheHit> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "cache lock poisoned, treating as miss");
                return None;
            }
        };

        let (expired, invalid) = {
            let entry = entries.get(key)?;
            (
                entry.inserted_at.elapsed() > self.config.ttl,
                !is_valid_response(&entry.response),
            )
        };
        if expired {
            entries.remove(key);
            debug!(key = %key, "cache entry expired");
            return None;
        }
        if invalid {
            entries.remove(key);
            warn!(key = %key, "invalid cache entry removed");
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.last_access = Instant::now();

        let mut response = entry.response.clone();
        response.cache_hit = true;
        Some(CacheHit {
            response,
            match_type: CacheMatch::Exact,
            similarity: 1.0,
        })
    }

    async fn get_semantic(&self, query: &str) -> Option<CacheHit> {
        let embedder = self.embedder.as_ref()?;
        let query_embedding = match embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "semantic cache lookup failed, treating as miss");
                return None;
            }
        };

        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "cache lock poisoned, treating as miss");
                return None;
            }
        };

        let now = Instant::now();
        let ttl = self.config.ttl;

        // Drop expired entries as we scan
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);

        let mut best: Option<(String, f32)> = None;
        for (key, entry) in entries.iter() {
            let Some(ref embedding) = entry.embedding else {
                continue;
            };
            let similarity = cosine_similarity(&query_embedding, embedding);
            if similarity >= self.config.near_threshold
                && best.as_ref().is_none_or(|(_, s)| similarity > *s)
            {
                best = Some((key.clone(), similarity));
            }
        }

        let (key, similarity) = best?;

        let invalid = entries
            .get(&key)
            .is_none_or(|entry| !is_valid_response(&entry.response));
        if invalid {
            entries.remove(&key);
            warn!(key = %key, "invalid cache entry removed");
            return None;
        }

        let entry = entries.get_mut(&key)?;
        entry.last_access = now;
        let mut response = entry.response.clone();
        response.cache_hit = true;

        Some(CacheHit {
            response,
            match_type: CacheMatch::Semantic,
            similarity,
        })
    }

    /// Stores a response, subject to the validity predicates.
    ///
    /// Invalid responses are silently dropped; embedding failures store
    /// the entry without semantic lookup.
    pub async fn set(&self, query: &str, top_k: usize, response: SpeculativeResponse) {
        if !is_valid_response(&response) {
            debug!("skipping cache for invalid response");
            return;
        }

        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(query).await {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!(error = %e, "embedding failed, caching without semantic index");
                    None
                }
            },
            None => None,
        };

        let key = Self::fingerprint(query, top_k);
        let now = Instant::now();

        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "cache lock poisoned, dropping entry");
                return;
            }
        };

        if entries.len() >= self.config.max_entries {
            Self::evict(&mut entries, self.config.max_entries);
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                embedding,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the least-recently-accessed 10% of entries.
    fn evict(entries: &mut HashMap<String, CacheEntry>, max_entries: usize) {
        let evict_count = (max_entries / 10).max(1);

        let mut by_access: Vec<(String, Instant)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_access))
            .collect();
        by_access.sort_by_key(|(_, access)| *access);

        for (key, _) in by_access.into_iter().take(evict_count) {
            entries.remove(&key);
        }

        info!(evicted = evict_count, "cache eviction (LRU)");
    }
}

impl std::fmt::Debug for SpeculativeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeculativeCache")
            .field("entries", &self.len())
            .field("semantic_index", &self.embedder.is_some())
            .field("config", &self.config)
            .finish()
    }
}
