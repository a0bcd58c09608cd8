//! # Tandem
//!
//! Hybrid speculative + agentic RAG query engine with progressive
//! streaming responses.
//!
//! Tandem answers a question by running two complementary paths under
//! one router: a low-latency **speculative** path (cache + one-shot
//! retrieval + short generation) and a deep **agentic** path
//! (plan/act/observe/respond reasoning). A coordinator fuses their
//! outputs into an ordered, deduplicated, progressively refined chunk
//! stream with exactly one terminal FINAL chunk.
//!
//! ## Features
//!
//! - **Mode routing**: AUTO resolves to FAST / BALANCED / DEEP from a
//!   deterministic query-complexity score
//! - **Hybrid retrieval**: vector + BM25 candidates merged with
//!   Reciprocal Rank Fusion when the query calls for exact matching
//! - **Semantic caching**: exact fingerprint plus embedding-similarity
//!   lookup, TTL- and LRU-bounded
//! - **Graceful degradation**: every backend failure downgrades to a
//!   usable answer; a stream always ends in a FINAL chunk

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod agentic;
pub mod analyze;
pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinate;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod model;
pub mod retrieval;
pub mod router;
pub mod session;
pub mod speculative;
pub mod text;

// Re-export commonly used types at crate root
pub use error::{Error, FailureKind, Result};

// Core data model
pub use model::{
    PathSource, QueryMode, QueryRequest, ReasoningStep, ResponseChunk, ResponseType, Source,
    SpeculativeResponse, StepKind,
};

// Components
pub use agentic::{AgenticConfig, AgenticProcessor};
pub use analyze::{ComplexityAnalyzer, ComplexityLevel, ComplexityReport};
pub use cache::{CacheConfig, CacheHit, CacheMatch, SpeculativeCache};
pub use config::EngineConfig;
pub use coordinate::{ResponseCoordinator, VersionLog};
pub use retrieval::{RetrievalFusion, RetrievalMethod, RetrievalOutcome};
pub use router::{HybridRouter, RateLimiter, ResponseStream};
pub use speculative::{SpeculativeConfig, SpeculativeProcessor};

// Backend contracts and reference implementations
pub use embedding::{DEFAULT_DIMENSIONS, Embedder, HashEmbedder, cosine_similarity};
pub use index::{
    Document, LexicalIndex, MemoryLexicalIndex, MemoryVectorIndex, VectorIndex, WebSearch,
};
pub use llm::LlmProvider;
#[cfg(feature = "openai")]
pub use llm::OpenAiProvider;
pub use session::{MemorySessionStore, SessionMessage, SessionStore};
