//! Error types for the hybrid query engine.
//!
//! This module provides an error hierarchy using `thiserror` covering
//! routing, retrieval, LLM, cache, and session operations, plus the
//! [`FailureKind`] categories surfaced to callers in chunk metadata.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Routing and admission errors.
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Retrieval backend errors.
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// LLM backend errors.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Cache backend errors.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Session store errors.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Routing and request-admission errors.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// Query text failed validation.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Why the query was rejected.
        reason: String,
    },

    /// `top_k` outside the accepted `[1, 50]` range.
    #[error("top_k {top_k} outside accepted range 1..=50")]
    TopKOutOfRange {
        /// The rejected value.
        top_k: usize,
    },

    /// A per-path timeout override outside its accepted range.
    #[error("{which} timeout {seconds}s outside accepted range {min}..={max}s")]
    TimeoutOutOfRange {
        /// Which timeout was rejected (`speculative` or `agentic`).
        which: &'static str,
        /// The rejected value in seconds.
        seconds: f64,
        /// Lower bound in seconds.
        min: f64,
        /// Upper bound in seconds.
        max: f64,
    },

    /// The caller exceeded the request rate limit.
    #[error("rate limit exceeded, {remaining} requests remaining in window")]
    RateLimited {
        /// Requests remaining in the current window.
        remaining: usize,
    },

    /// Neither path produced a usable result.
    #[error("both processing paths failed")]
    BothPathsFailed,

    /// The output stream was closed by the consumer.
    #[error("query cancelled by consumer")]
    Cancelled,
}

/// Retrieval-layer errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding generation failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector index search failed.
    #[error("vector search failed: {0}")]
    VectorSearch(String),

    /// Lexical index search failed.
    #[error("lexical search failed: {0}")]
    LexicalSearch(String),

    /// Web search failed.
    #[error("web search failed: {0}")]
    WebSearch(String),

    /// Retrieval exceeded its deadline.
    #[error("retrieval timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time before the deadline fired.
        elapsed_ms: u64,
    },

    /// Every configured backend failed for this query.
    #[error("all retrieval backends failed")]
    AllBackendsFailed,
}

/// LLM backend errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// API request failed.
    #[error("API request failed: {message}")]
    Api {
        /// Error message from the API or transport.
        message: String,
        /// HTTP status code, when one was received.
        status: Option<u16>,
    },

    /// Generation exceeded its deadline.
    #[error("generation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time before the deadline fired.
        elapsed_ms: u64,
    },

    /// The model returned an empty completion.
    #[error("model returned an empty completion")]
    EmptyCompletion,

    /// No API key was configured for the provider.
    #[error("no API key found (set OPENAI_API_KEY or TANDEM_API_KEY)")]
    ApiKeyMissing,
}

/// Cache-layer errors. Always non-fatal to query processing.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend operation failed.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// Entry serialization failed.
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Session store errors. Always non-fatal to query processing.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Backend operation failed.
    #[error("session backend error: {0}")]
    Backend(String),
}

/// Caller-facing failure category.
///
/// These are the coarse error kinds surfaced in chunk metadata
/// (`metadata.error`); internal detail stays in logs. The string forms
/// are part of the wire contract and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An external call exceeded its deadline.
    Timeout,
    /// Vector and lexical retrieval both failed.
    RetrievalUnavailable,
    /// The LLM backend failed; a fallback rendering was used.
    LlmUnavailable,
    /// The cache backend failed (never surfaced to callers).
    CacheUnavailable,
    /// A single path failed unexpectedly.
    PathFailed,
    /// Both paths failed; a diagnostic FINAL was emitted.
    BothPathsFailed,
    /// The admission gate refused the request.
    RateLimited,
    /// The request failed validation at router entry.
    InvalidInput,
}

impl FailureKind {
    /// Returns the stable string form used in chunk metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RetrievalUnavailable => "retrieval_unavailable",
            Self::LlmUnavailable => "llm_unavailable",
            Self::CacheUnavailable => "cache_unavailable",
            Self::PathFailed => "path_failed",
            Self::BothPathsFailed => "both_paths_failed",
            Self::RateLimited => "rate_limited",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Maps this error to the failure category surfaced to callers.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Routing(e) => match e {
                RoutingError::InvalidQuery { .. }
                | RoutingError::TopKOutOfRange { .. }
                | RoutingError::TimeoutOutOfRange { .. } => FailureKind::InvalidInput,
                RoutingError::RateLimited { .. } => FailureKind::RateLimited,
                RoutingError::BothPathsFailed => FailureKind::BothPathsFailed,
                RoutingError::Cancelled => FailureKind::PathFailed,
            },
            Self::Retrieval(e) => match e {
                RetrievalError::Timeout { .. } => FailureKind::Timeout,
                _ => FailureKind::RetrievalUnavailable,
            },
            Self::Llm(e) => match e {
                LlmError::Timeout { .. } => FailureKind::Timeout,
                _ => FailureKind::LlmUnavailable,
            },
            Self::Cache(_) => FailureKind::CacheUnavailable,
            Self::Session(_) | Self::Config { .. } => FailureKind::PathFailed,
        }
    }
}
