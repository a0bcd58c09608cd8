//! Core data model for the hybrid query engine.
//!
//! Tagged variants (modes, chunk types, path sources, step kinds) and
//! the record types that flow through the engine: retrieved sources,
//! reasoning steps, speculative responses, and the streamed response
//! chunk envelope. All wire-facing types serialize with `serde`; the
//! string forms of the enums are part of the wire contract.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RoutingError;
use crate::text::lcs_ratio;

/// Open string-keyed metadata map carried on chunks, steps, and
/// responses. Additive only; core fields never move into it.
pub type Metadata = HashMap<String, Value>;

/// Maximum accepted query length in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;

/// Accepted `top_k` range.
pub const TOP_K_RANGE: std::ops::RangeInclusive<usize> = 1..=50;

/// Accepted speculative timeout range in seconds.
pub const SPECULATIVE_TIMEOUT_RANGE: std::ops::RangeInclusive<f64> = 0.5..=5.0;

/// Accepted agentic timeout range in seconds.
pub const AGENTIC_TIMEOUT_RANGE: std::ops::RangeInclusive<f64> = 5.0..=60.0;

/// Text similarity at or above which two sources are considered
/// equivalent.
pub const SOURCE_EQUIVALENCE_THRESHOLD: f32 = 0.85;

/// Query processing mode.
///
/// `Auto` is a pre-dispatch value resolved by the complexity analyzer
/// before any path runs; it never appears on an emitted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Resolve the mode from query complexity (default).
    Auto,
    /// Speculative path only; lowest latency.
    Fast,
    /// Both paths in parallel with progressive refinement.
    Balanced,
    /// Agentic path only; full multi-step reasoning.
    Deep,
    /// Agentic path with the web-search tool forced on.
    WebSearch,
}

impl QueryMode {
    /// Parses a mode string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "fast" => Some(Self::Fast),
            "balanced" => Some(Self::Balanced),
            "deep" => Some(Self::Deep),
            "web_search" | "web-search" => Some(Self::WebSearch),
            _ => None,
        }
    }

    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Deep => "deep",
            Self::WebSearch => "web_search",
        }
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a chunk in the progressive response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Initial fast answer from the speculative path.
    Preliminary,
    /// Incremental update from the agentic path.
    Refinement,
    /// The single terminal chunk of a stream.
    Final,
}

/// Which path produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    /// Fast retrieval + single-shot generation.
    Speculative,
    /// Multi-step plan/act/observe reasoning.
    Agentic,
    /// Merged output of both paths.
    Hybrid,
    /// Agentic path with web search.
    WebSearch,
}

impl PathSource {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Speculative => "speculative",
            Self::Agentic => "agentic",
            Self::Hybrid => "hybrid",
            Self::WebSearch => "web_search",
        }
    }
}

impl std::fmt::Display for PathSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved chunk of source material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Globally unique chunk identifier.
    pub chunk_id: String,
    /// Identifier of the source document.
    pub document_id: String,
    /// Human-readable document name.
    pub document_name: String,
    /// The matching text content.
    pub text: String,
    /// Normalized relevance score in `[0, 1]`.
    pub score: f32,
    /// Additional metadata (page, section, origin tags).
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Source {
    /// Returns `true` if two sources refer to the same underlying
    /// content: matching chunk IDs, or text similarity at or above the
    /// equivalence threshold.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.chunk_id == other.chunk_id
            || lcs_ratio(&self.text, &other.text) >= SOURCE_EQUIVALENCE_THRESHOLD
    }
}

/// Kind of a reasoning step in the agentic trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Free-form intermediate thought.
    Thought,
    /// Tool invocation about to run.
    Action,
    /// Summary of tool output.
    Observation,
    /// Subtask plan for the question.
    Planning,
    /// Plan revision after reviewing evidence.
    Reflection,
    /// Terminal answer step.
    Response,
    /// Context recalled from the session store.
    Memory,
    /// Error encountered mid-trace.
    Error,
}

impl StepKind {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Action => "action",
            Self::Observation => "observation",
            Self::Planning => "planning",
            Self::Reflection => "reflection",
            Self::Response => "response",
            Self::Memory => "memory",
            Self::Error => "error",
        }
    }
}

/// A single step in the agentic reasoning trace. Order is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Identifier unique within the trace (e.g. `step_003`).
    pub step_id: String,
    /// Kind of step.
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Step content.
    pub content: String,
    /// When the step was produced.
    pub timestamp: DateTime<Utc>,
    /// Additional metadata. The terminal `response` step carries the
    /// final sources and confidence here.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ReasoningStep {
    /// Creates a step with the current timestamp and empty metadata.
    #[must_use]
    pub fn new(step_id: impl Into<String>, kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Response from the speculative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeculativeResponse {
    /// Generated answer text.
    pub text: String,
    /// Confidence in `[0, 1]` derived from retrieval quality.
    pub confidence: f32,
    /// Ordered source documents backing the answer.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Whether the response came from the cache.
    #[serde(default)]
    pub cache_hit: bool,
    /// Wall-clock time the path took.
    #[serde(with = "duration_secs")]
    pub processing_time: Duration,
    /// Additional metadata (search timings, query type, error markers).
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// One element of the progressive response stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseChunk {
    /// Identifier unique and monotonically increasing within the
    /// stream (`{query_id}_chunk_{NNN}`).
    pub chunk_id: String,
    /// Chunk type.
    #[serde(rename = "type")]
    pub kind: ResponseType,
    /// Path that produced the chunk.
    pub path_source: PathSource,
    /// Chunk content.
    pub content: String,
    /// Confidence in `[0, 1]`, when the producing path scored one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Deduplicated source documents for this chunk.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Reasoning steps attached to this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_steps: Vec<ReasoningStep>,
    /// When the chunk was emitted.
    pub timestamp: DateTime<Utc>,
    /// Additional metadata (`mode_used`, routing info, cache info).
    #[serde(default)]
    pub metadata: Metadata,
}

/// A query request. Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The user's query text.
    pub query: String,
    /// Requested processing mode.
    #[serde(default = "default_mode")]
    pub mode: QueryMode,
    /// Session identifier for conversation context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Caller identity for the admission gate (e.g. an IP address).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Number of sources to retrieve.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Whether the speculative path may use the cache.
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    /// Speculative path timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speculative_timeout: Option<f64>,
    /// Agentic path timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agentic_timeout: Option<f64>,
}

const fn default_mode() -> QueryMode {
    QueryMode::Auto
}

const fn default_top_k() -> usize {
    10
}

const fn default_true() -> bool {
    true
}

impl QueryRequest {
    /// Creates a request with defaults (AUTO mode, `top_k` 10, caching
    /// on).
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: QueryMode::Auto,
            session_id: None,
            client_id: None,
            top_k: default_top_k(),
            enable_cache: true,
            speculative_timeout: None,
            agentic_timeout: None,
        }
    }

    /// Sets the processing mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the session identifier.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the caller identity for rate limiting.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the number of sources to retrieve.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Enables or disables the speculative cache.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    /// Overrides the speculative path timeout in seconds.
    #[must_use]
    pub const fn with_speculative_timeout(mut self, seconds: f64) -> Self {
        self.speculative_timeout = Some(seconds);
        self
    }

    /// Overrides the agentic path timeout in seconds.
    #[must_use]
    pub const fn with_agentic_timeout(mut self, seconds: f64) -> Self {
        self.agentic_timeout = Some(seconds);
        self
    }

    /// Validates the request at router entry.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] for an empty or oversized query,
    /// out-of-range `top_k`, or out-of-range timeout overrides.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.query.trim().is_empty() {
            return Err(RoutingError::InvalidQuery {
                reason: "query cannot be empty".to_string(),
            });
        }
        if self.query.len() > MAX_QUERY_LEN {
            return Err(RoutingError::InvalidQuery {
                reason: format!(
                    "query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                    self.query.len()
                ),
            });
        }
        if !TOP_K_RANGE.contains(&self.top_k) {
            return Err(RoutingError::TopKOutOfRange { top_k: self.top_k });
        }
        if let Some(secs) = self.speculative_timeout
            && !SPECULATIVE_TIMEOUT_RANGE.contains(&secs)
        {
            return Err(RoutingError::TimeoutOutOfRange {
                which: "speculative",
                seconds: secs,
                min: *SPECULATIVE_TIMEOUT_RANGE.start(),
                max: *SPECULATIVE_TIMEOUT_RANGE.end(),
            });
        }
        if let Some(secs) = self.agentic_timeout
            && !AGENTIC_TIMEOUT_RANGE.contains(&secs)
        {
            return Err(RoutingError::TimeoutOutOfRange {
                which: "agentic",
                seconds: secs,
                min: *AGENTIC_TIMEOUT_RANGE.start(),
                max: *AGENTIC_TIMEOUT_RANGE.end(),
            });
        }
        Ok(())
    }
}

/// Serde helpers for durations as fractional seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(chunk_id: &str, text: &str, score: f32) -> Source {
        Source {
            chunk_id: chunk_id.to_string(),
            document_id: "doc1".to_string(),
            document_name: "doc1.pdf".to_string(),
            text: text.to_string(),
            score,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(QueryMode::parse("fast"), Some(QueryMode::Fast));
        assert_eq!(QueryMode::parse("BALANCED"), Some(QueryMode::Balanced));
        assert_eq!(QueryMode::parse("web_search"), Some(QueryMode::WebSearch));
        assert_eq!(QueryMode::parse("web-search"), Some(QueryMode::WebSearch));
        assert_eq!(QueryMode::parse("bogus"), None);
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&QueryMode::WebSearch).unwrap_or_default();
        assert_eq!(json, "\"web_search\"");
        let json = serde_json::to_string(&QueryMode::Fast).unwrap_or_default();
        assert_eq!(json, "\"fast\"");
    }

    #[test]
    fn test_response_type_serialization() {
        let json = serde_json::to_string(&ResponseType::Preliminary).unwrap_or_default();
        assert_eq!(json, "\"preliminary\"");
    }

    #[test]
    fn test_source_equivalence_by_id() {
        let a = source("c1", "completely different text", 0.9);
        let b = source("c1", "nothing alike here at all!", 0.5);
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn test_source_equivalence_by_text() {
        let a = source(
            "c1",
            "Machine learning models require large datasets for training.",
            0.9,
        );
        let b = source(
            "c2",
            "Machine learning models require large datasets for training!",
            0.8,
        );
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn test_source_not_equivalent() {
        let a = source("c1", "Transformers use self-attention.", 0.9);
        let b = source("c2", "BM25 ranks by term frequency.", 0.8);
        assert!(!a.is_equivalent(&b));
    }

    #[test]
    fn test_reasoning_step_serialization_uses_type_key() {
        let step = ReasoningStep::new("step_001", StepKind::Planning, "plan");
        let json = serde_json::to_string(&step).unwrap_or_default();
        assert!(json.contains("\"type\":\"planning\""));
        assert!(!json.contains("\"kind\""));
    }

    #[test]
    fn test_chunk_serialization_envelope() {
        let chunk = ResponseChunk {
            chunk_id: "q1_chunk_001".to_string(),
            kind: ResponseType::Final,
            path_source: PathSource::Hybrid,
            content: "answer".to_string(),
            confidence: Some(0.9),
            sources: vec![],
            reasoning_steps: vec![],
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        };
        let json = serde_json::to_string(&chunk).unwrap_or_default();
        assert!(json.contains("\"type\":\"final\""));
        assert!(json.contains("\"path_source\":\"hybrid\""));
    }

    #[test]
    fn test_request_defaults() {
        let req = QueryRequest::new("What is Rust?");
        assert_eq!(req.mode, QueryMode::Auto);
        assert_eq!(req.top_k, 10);
        assert!(req.enable_cache);
        assert!(req.session_id.is_none());
    }

    #[test]
    fn test_request_validate_ok() {
        assert!(QueryRequest::new("What is Rust?").validate().is_ok());
    }

    #[test]
    fn test_request_validate_empty_query() {
        let err = QueryRequest::new("   ").validate().unwrap_err();
        assert!(matches!(err, RoutingError::InvalidQuery { .. }));
    }

    #[test]
    fn test_request_validate_top_k_bounds() {
        assert!(QueryRequest::new("q").with_top_k(0).validate().is_err());
        assert!(QueryRequest::new("q").with_top_k(51).validate().is_err());
        assert!(QueryRequest::new("q").with_top_k(1).validate().is_ok());
        assert!(QueryRequest::new("q").with_top_k(50).validate().is_ok());
    }

    #[test]
    fn test_request_validate_timeout_bounds() {
        let err = QueryRequest::new("q")
            .with_speculative_timeout(9.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RoutingError::TimeoutOutOfRange { .. }));

        let err = QueryRequest::new("q")
            .with_agentic_timeout(1.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RoutingError::TimeoutOutOfRange { .. }));

        assert!(
            QueryRequest::new("q")
                .with_speculative_timeout(0.5)
                .with_agentic_timeout(60.0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_speculative_response_round_trip() {
        let resp = SpeculativeResponse {
            text: "answer".to_string(),
            confidence: 0.8,
            sources: vec![source("c1", "text", 0.9)],
            cache_hit: false,
            processing_time: Duration::from_millis(1500),
            metadata: Metadata::new(),
        };
        let json = serde_json::to_string(&resp).unwrap_or_default();
        let back: SpeculativeResponse = serde_json::from_str(&json).unwrap_or_else(|e| {
            unreachable!("round trip failed: {e}");
        });
        assert_eq!(back.text, "answer");
        assert!((back.processing_time.as_secs_f64() - 1.5).abs() < 1e-9);
    }
}
