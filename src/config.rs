//! Engine configuration with builder pattern and environment variable
//! support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults.

use std::time::Duration;

use crate::error::Error;
use crate::model::QueryMode;

/// Default speculative path deadline (request-level default; FAST
/// deployments commonly lower this to 1 s).
const DEFAULT_SPECULATIVE_DEADLINE: Duration = Duration::from_secs(2);
/// Default agentic path deadline (DEEP deployments commonly raise this
/// to 30 s).
const DEFAULT_AGENTIC_DEADLINE: Duration = Duration::from_secs(15);
/// Default cache TTL.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Default cache capacity.
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
/// Default semantic-similarity threshold for cache hits.
const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.85;
/// Default admission gate: requests per caller per minute.
const DEFAULT_RATE_LIMIT_PER_MINUTE: usize = 20;
/// Default top-k when the caller omits it.
const DEFAULT_TOP_K: usize = 10;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Mode used when the caller omits one and intelligent routing is
    /// disabled.
    pub default_mode: QueryMode,
    /// Whether AUTO resolves via the complexity analyzer. When false,
    /// AUTO collapses to `default_mode`.
    pub enable_intelligent_routing: bool,
    /// Speculative path deadline, overridable per request.
    pub speculative_deadline: Duration,
    /// Agentic path deadline, overridable per request.
    pub agentic_deadline: Duration,
    /// Cache entry time-to-live.
    pub cache_ttl: Duration,
    /// Cache capacity before LRU eviction.
    pub cache_max_entries: usize,
    /// Minimum embedding similarity for a semantic cache hit.
    pub semantic_similarity_threshold: f32,
    /// Requests admitted per caller per 60-second window.
    pub rate_limit_per_minute: usize,
    /// Default top-k for requests that omit it.
    pub top_k_default: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: QueryMode::Balanced,
            enable_intelligent_routing: true,
            speculative_deadline: DEFAULT_SPECULATIVE_DEADLINE,
            agentic_deadline: DEFAULT_AGENTIC_DEADLINE,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            semantic_similarity_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            top_k_default: DEFAULT_TOP_K,
        }
    }
}

impl EngineConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when an environment value fails to
    /// parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::builder().from_env()?.build()
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    default_mode: Option<QueryMode>,
    enable_intelligent_routing: Option<bool>,
    speculative_deadline: Option<Duration>,
    agentic_deadline: Option<Duration>,
    cache_ttl: Option<Duration>,
    cache_max_entries: Option<usize>,
    semantic_similarity_threshold: Option<f32>,
    rate_limit_per_minute: Option<usize>,
    top_k_default: Option<usize>,
}

impl EngineConfigBuilder {
    /// Populates unset fields from `TANDEM_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a set variable fails to parse.
    pub fn from_env(mut self) -> Result<Self, Error> {
        fn parse<T: std::str::FromStr>(var: &str) -> Result<Option<T>, Error> {
            match std::env::var(var) {
                Ok(value) => value.parse().map(Some).map_err(|_| Error::Config {
                    message: format!("invalid value for {var}: {value}"),
                }),
                Err(_) => Ok(None),
            }
        }

        if self.default_mode.is_none()
            && let Ok(value) = std::env::var("TANDEM_DEFAULT_MODE")
        {
            self.default_mode = Some(QueryMode::parse(&value).ok_or_else(|| Error::Config {
                message: format!("invalid value for TANDEM_DEFAULT_MODE: {value}"),
            })?);
        }
        if self.enable_intelligent_routing.is_none() {
            self.enable_intelligent_routing = parse::<bool>("TANDEM_INTELLIGENT_ROUTING")?;
        }
        if self.speculative_deadline.is_none() {
            self.speculative_deadline =
                parse::<f64>("TANDEM_SPECULATIVE_DEADLINE_SECS")?.map(Duration::from_secs_f64);
        }
        if self.agentic_deadline.is_none() {
            self.agentic_deadline =
                parse::<f64>("TANDEM_AGENTIC_DEADLINE_SECS")?.map(Duration::from_secs_f64);
        }
        if self.cache_ttl.is_none() {
            self.cache_ttl = parse::<u64>("TANDEM_CACHE_TTL_SECS")?.map(Duration::from_secs);
        }
        if self.cache_max_entries.is_none() {
            self.cache_max_entries = parse::<usize>("TANDEM_CACHE_MAX_ENTRIES")?;
        }
        if self.semantic_similarity_threshold.is_none() {
            self.semantic_similarity_threshold = parse::<f32>("TANDEM_SEMANTIC_THRESHOLD")?;
        }
        if self.rate_limit_per_minute.is_none() {
            self.rate_limit_per_minute = parse::<usize>("TANDEM_RATE_LIMIT_PER_MINUTE")?;
        }
        if self.top_k_default.is_none() {
            self.top_k_default = parse::<usize>("TANDEM_TOP_K_DEFAULT")?;
        }

        Ok(self)
    }

    /// Sets the default mode.
    #[must_use]
    pub const fn default_mode(mut self, mode: QueryMode) -> Self {
        self.default_mode = Some(mode);
        self
    }

    /// Enables or disables intelligent AUTO routing.
    #[must_use]
    pub const fn enable_intelligent_routing(mut self, enabled: bool) -> Self {
        self.enable_intelligent_routing = Some(enabled);
        self
    }

    /// Sets the speculative path deadline.
    #[must_use]
    pub const fn speculative_deadline(mut self, deadline: Duration) -> Self {
        self.speculative_deadline = Some(deadline);
        self
    }

    /// Sets the agentic path deadline.
    #[must_use]
    pub const fn agentic_deadline(mut self, deadline: Duration) -> Self {
        self.agentic_deadline = Some(deadline);
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub const fn cache_max_entries(mut self, n: usize) -> Self {
        self.cache_max_entries = Some(n);
        self
    }

    /// Sets the semantic cache-hit threshold.
    #[must_use]
    pub const fn semantic_similarity_threshold(mut self, threshold: f32) -> Self {
        self.semantic_similarity_threshold = Some(threshold);
        self
    }

    /// Sets the admission rate limit.
    #[must_use]
    pub const fn rate_limit_per_minute(mut self, n: usize) -> Self {
        self.rate_limit_per_minute = Some(n);
        self
    }

    /// Sets the default top-k.
    #[must_use]
    pub const fn top_k_default(mut self, n: usize) -> Self {
        self.top_k_default = Some(n);
        self
    }

    /// Builds the [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the default mode is `Auto` while
    /// intelligent routing is disabled (the collapse target must be
    /// concrete).
    pub fn build(self) -> Result<EngineConfig, Error> {
        let default_mode = self.default_mode.unwrap_or(QueryMode::Balanced);
        if default_mode == QueryMode::Auto {
            return Err(Error::Config {
                message: "default_mode must be a concrete mode, not auto".to_string(),
            });
        }

        Ok(EngineConfig {
            default_mode,
            enable_intelligent_routing: self.enable_intelligent_routing.unwrap_or(true),
            speculative_deadline: self
                .speculative_deadline
                .unwrap_or(DEFAULT_SPECULATIVE_DEADLINE),
            agentic_deadline: self.agentic_deadline.unwrap_or(DEFAULT_AGENTIC_DEADLINE),
            cache_ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            cache_max_entries: self.cache_max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            semantic_similarity_threshold: self
                .semantic_similarity_threshold
                .unwrap_or(DEFAULT_SEMANTIC_THRESHOLD),
            rate_limit_per_minute: self
                .rate_limit_per_minute
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE),
            top_k_default: self.top_k_default.unwrap_or(DEFAULT_TOP_K),
        })
    }
}
