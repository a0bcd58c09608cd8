//! In-memory reference search backends.
//!
//! Linear-scan cosine similarity for the vector side and BM25 scoring
//! for the lexical side, over a shared document list. Suitable for
//! small corpora (the CLI demo, tests); real deployments use external
//! engines behind the same traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LexicalIndex, VectorIndex};
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::RetrievalError;
use crate::model::{Metadata, Source};

/// BM25 term-frequency saturation parameter.
const BM25_K1: f64 = 1.2;
/// BM25 length-normalization parameter.
const BM25_B: f64 = 0.75;

/// A document loaded into the in-memory indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Full document text.
    pub text: String,
}

impl Document {
    fn to_source(&self, score: f32) -> Source {
        Source {
            chunk_id: self.id.clone(),
            document_id: self.id.clone(),
            document_name: self.name.clone(),
            text: self.text.clone(),
            score,
            metadata: Metadata::new(),
        }
    }
}

/// Linear-scan vector index over pre-embedded documents.
pub struct MemoryVectorIndex {
    entries: Vec<(Document, Vec<f32>)>,
}

impl MemoryVectorIndex {
    /// Builds the index by embedding every document.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] if any document fails to
    /// embed.
    pub async fn build(
        documents: Vec<Document>,
        embedder: &Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let mut entries = Vec::with_capacity(documents.len());
        for doc in documents {
            let embedding = embedder.embed(&doc.text).await?;
            entries.push((doc, embedding));
        }
        Ok(Self { entries })
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVectorIndex")
            .field("documents", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Source>, RetrievalError> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, emb))| (i, cosine_similarity(embedding, emb).max(0.0)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| self.entries[i].0.to_source(score))
            .collect())
    }
}

/// In-memory BM25 lexical index.
pub struct MemoryLexicalIndex {
    documents: Vec<Document>,
    term_frequencies: Vec<HashMap<String, usize>>,
    document_frequencies: HashMap<String, usize>,
    lengths: Vec<usize>,
    avg_length: f64,
}

impl MemoryLexicalIndex {
    /// Builds the index, tokenizing every document.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn build(documents: Vec<Document>) -> Self {
        let mut term_frequencies = Vec::with_capacity(documents.len());
        let mut document_frequencies: HashMap<String, usize> = HashMap::new();
        let mut lengths = Vec::with_capacity(documents.len());

        for doc in &documents {
            let tokens = tokenize(&doc.text);
            lengths.push(tokens.len());

            let mut tf: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *document_frequencies.entry(term.clone()).or_insert(0) += 1;
            }
            term_frequencies.push(tf);
        }

        let avg_length = if lengths.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
        };

        Self {
            documents,
            term_frequencies,
            document_frequencies,
            lengths,
            avg_length,
        }
    }

    /// BM25 score of one document for the given query terms.
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, doc_idx: usize, terms: &[String]) -> f64 {
        let n = self.documents.len() as f64;
        let tf_map = &self.term_frequencies[doc_idx];
        let len_norm = self.lengths[doc_idx] as f64 / self.avg_length.max(1.0);

        terms
            .iter()
            .map(|term| {
                let tf = tf_map.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f64;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len_norm))
            })
            .sum()
    }
}

impl std::fmt::Debug for MemoryLexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLexicalIndex")
            .field("documents", &self.documents.len())
            .field("terms", &self.document_frequencies.len())
            .finish()
    }
}

#[async_trait]
impl LexicalIndex for MemoryLexicalIndex {
    #[allow(clippy::cast_possible_truncation)]
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Source>, RetrievalError> {
        let terms = tokenize(query);
        if terms.is_empty() || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f64)> = (0..self.documents.len())
            .map(|i| (i, self.score(i, &terms)))
            .filter(|(_, s)| *s > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        // Normalize to [0, 1] against the best score in this result set
        let max_score = scored.first().map_or(1.0, |(_, s)| *s).max(f64::EPSILON);

        Ok(scored
            .into_iter()
            .map(|(i, score)| self.documents[i].to_source((score / max_score) as f32))
            .collect())
    }
}

/// Lowercased alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
