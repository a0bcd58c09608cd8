//! Search backend contracts.
//!
//! The vector index, lexical index, and web search are external
//! collaborators consumed through narrow async traits. In-memory
//! reference implementations ([`MemoryVectorIndex`],
//! [`MemoryLexicalIndex`]) back the CLI and the test suite; production
//! deployments plug in real engines.

mod memory;

pub use memory::{Document, MemoryLexicalIndex, MemoryVectorIndex};

use async_trait::async_trait;

use crate::error::RetrievalError;
use crate::model::Source;

/// Nearest-neighbour search over document embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Searches for the `top_k` most similar chunks.
    ///
    /// Results are sorted by descending similarity score in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::VectorSearch`] on backend failure.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Source>, RetrievalError>;
}

/// Keyword search over document text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Searches for the `top_k` best keyword matches.
    ///
    /// Results are sorted by descending score, normalized to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::LexicalSearch`] on backend failure.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Source>, RetrievalError>;
}

/// Web search tool for the agentic path (DEEP / WEB_SEARCH modes).
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Searches the web and returns up to `n` results as sources.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::WebSearch`] on backend failure; the
    /// caller degrades to an empty result list.
    async fn search(&self, query: &str, n: usize) -> Result<Vec<Source>, RetrievalError>;
}
