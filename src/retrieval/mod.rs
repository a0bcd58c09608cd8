//! Retrieval fusion: vector search with optional lexical fusion.
//!
//! Runs vector search always, and lexical search in parallel when the
//! query-type classifier recommends it (exact terms, comparisons,
//! technical queries), merging candidates with Reciprocal Rank Fusion.
//! Retrieval never fails the query: backend errors degrade to the
//! surviving backend or an empty result.

mod rrf;

pub use rrf::{RrfConfig, reciprocal_rank_fusion};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::analyze::QueryTypeAnalyzer;
use crate::embedding::Embedder;
use crate::error::RetrievalError;
use crate::index::{LexicalIndex, VectorIndex};
use crate::model::Source;

/// How a result set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMethod {
    /// Vector search only.
    Vector,
    /// Lexical search only (vector side failed).
    Lexical,
    /// Vector + lexical merged with RRF.
    Hybrid,
    /// Every backend failed; result list is empty.
    None,
}

impl RetrievalMethod {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Lexical => "lexical",
            Self::Hybrid => "hybrid",
            Self::None => "none",
        }
    }
}

/// Result of a retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Up to `top_k` sources, ordered by fused score descending.
    pub sources: Vec<Source>,
    /// How the sources were produced.
    pub method: RetrievalMethod,
    /// Wall-clock time spent retrieving.
    pub elapsed: Duration,
}

impl RetrievalOutcome {
    fn empty(elapsed: Duration) -> Self {
        Self {
            sources: Vec::new(),
            method: RetrievalMethod::None,
            elapsed,
        }
    }
}

/// Retrieval component combining a vector index with an optional
/// lexical index.
pub struct RetrievalFusion {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorIndex>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    analyzer: QueryTypeAnalyzer,
    rrf: RrfConfig,
}

impl RetrievalFusion {
    /// Creates a fusion component. Pass `None` for `lexical` to
    /// disable hybrid retrieval entirely.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorIndex>,
        lexical: Option<Arc<dyn LexicalIndex>>,
    ) -> Self {
        Self {
            embedder,
            vector,
            lexical,
            analyzer: QueryTypeAnalyzer::new(),
            rrf: RrfConfig::default(),
        }
    }

    /// Overrides the RRF k parameter.
    #[must_use]
    pub const fn with_rrf_k(mut self, k: u32) -> Self {
        self.rrf = RrfConfig::new(k);
        self
    }

    /// Retrieves up to `top_k` sources for the query within `deadline`.
    ///
    /// Never returns an error: a failed backend degrades to the other,
    /// and total failure yields an empty outcome with method `none`.
    pub async fn retrieve(&self, query: &str, top_k: usize, deadline: Duration) -> RetrievalOutcome {
        let start = Instant::now();

        let use_hybrid = self.lexical.is_some() && {
            let report = self.analyzer.analyze(query);
            if report.use_hybrid {
                debug!(
                    kind = report.kind.as_str(),
                    confidence = report.confidence,
                    "hybrid retrieval selected"
                );
            }
            report.use_hybrid
        };

        let outcome = if use_hybrid {
            self.retrieve_hybrid(query, top_k, deadline, start).await
        } else {
            self.retrieve_vector(query, top_k, deadline, start).await
        };

        info!(
            method = outcome.method.as_str(),
            results = outcome.sources.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "retrieval complete"
        );

        outcome
    }

    /// Vector-only retrieval.
    async fn retrieve_vector(
        &self,
        query: &str,
        top_k: usize,
        deadline: Duration,
        start: Instant,
    ) -> RetrievalOutcome {
        match self.vector_candidates(query, top_k, deadline).await {
            Ok(mut sources) => {
                sources.truncate(top_k);
                RetrievalOutcome {
                    sources,
                    method: RetrievalMethod::Vector,
                    elapsed: start.elapsed(),
                }
            }
            Err(e) => {
                warn!(error = %e, "vector search failed");
                RetrievalOutcome::empty(start.elapsed())
            }
        }
    }

    /// Parallel vector + lexical retrieval merged with RRF.
    async fn retrieve_hybrid(
        &self,
        query: &str,
        top_k: usize,
        deadline: Duration,
        start: Instant,
    ) -> RetrievalOutcome {
        // Each leg fetches 2x candidates for the fusion to pick from
        let fetch = top_k * 2;

        let lexical = match &self.lexical {
            Some(l) => Arc::clone(l),
            None => return self.retrieve_vector(query, top_k, deadline, start).await,
        };

        let lexical_fut = async {
            tokio::time::timeout(deadline, lexical.search(query, fetch))
                .await
                .map_err(|_| RetrievalError::Timeout {
                    elapsed_ms: deadline.as_millis() as u64,
                })
                .and_then(|r| r)
        };

        let (vector_result, lexical_result) =
            tokio::join!(self.vector_candidates(query, fetch, deadline), lexical_fut);

        match (vector_result, lexical_result) {
            (Ok(vector), Ok(lexical)) => {
                let sources = Self::fuse(vector, lexical, top_k, &self.rrf);
                RetrievalOutcome {
                    sources,
                    method: RetrievalMethod::Hybrid,
                    elapsed: start.elapsed(),
                }
            }
            (Ok(mut vector), Err(e)) => {
                warn!(error = %e, "lexical search failed in hybrid, using vector only");
                vector.truncate(top_k);
                RetrievalOutcome {
                    sources: vector,
                    method: RetrievalMethod::Vector,
                    elapsed: start.elapsed(),
                }
            }
            (Err(e), Ok(mut lexical)) => {
                warn!(error = %e, "vector search failed in hybrid, using lexical only");
                lexical.truncate(top_k);
                RetrievalOutcome {
                    sources: lexical,
                    method: RetrievalMethod::Lexical,
                    elapsed: start.elapsed(),
                }
            }
            (Err(ve), Err(le)) => {
                warn!(vector_error = %ve, lexical_error = %le, "both retrieval backends failed");
                RetrievalOutcome::empty(start.elapsed())
            }
        }
    }

    /// Embeds the query and runs vector search, both under the
    /// deadline.
    async fn vector_candidates(
        &self,
        query: &str,
        fetch: usize,
        deadline: Duration,
    ) -> Result<Vec<Source>, RetrievalError> {
        let started = Instant::now();
        let timeout_err = || RetrievalError::Timeout {
            elapsed_ms: deadline.as_millis() as u64,
        };

        let embedding = tokio::time::timeout(deadline, self.embedder.embed(query))
            .await
            .map_err(|_| timeout_err())??;

        let remaining = deadline.saturating_sub(started.elapsed());
        tokio::time::timeout(remaining, self.vector.search(&embedding, fetch))
            .await
            .map_err(|_| timeout_err())?
    }

    /// Merges two candidate lists by RRF rank, keeping each chunk's
    /// original normalized score (vector preferred when both have it).
    fn fuse(
        vector: Vec<Source>,
        lexical: Vec<Source>,
        top_k: usize,
        rrf: &RrfConfig,
    ) -> Vec<Source> {
        if vector.is_empty() && lexical.is_empty() {
            return Vec::new();
        }
        if lexical.is_empty() {
            let mut v = vector;
            v.truncate(top_k);
            return v;
        }
        if vector.is_empty() {
            let mut l = lexical;
            l.truncate(top_k);
            return l;
        }

        let vector_ranked: Vec<&str> = vector.iter().map(|s| s.chunk_id.as_str()).collect();
        let lexical_ranked: Vec<&str> = lexical.iter().map(|s| s.chunk_id.as_str()).collect();

        let fused = reciprocal_rank_fusion(&[&vector_ranked, &lexical_ranked], rrf);

        let mut by_id: HashMap<&str, &Source> = HashMap::new();
        // Insert lexical first so vector entries win on collision
        for source in &lexical {
            by_id.insert(source.chunk_id.as_str(), source);
        }
        for source in &vector {
            by_id.insert(source.chunk_id.as_str(), source);
        }

        fused
            .into_iter()
            .take(top_k)
            .filter_map(|(chunk_id, _)| by_id.get(chunk_id.as_str()).map(|s| (*s).clone()))
            .collect()
    }
}

impl std::fmt::Debug for RetrievalFusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalFusion")
            .field("lexical_enabled", &self.lexical.is_some())
            .field("rrf_k", &self.rrf.k)
            .finish()
    }
}
