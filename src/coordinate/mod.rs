//! Response coordination: source dedup, merging, and versioning.
//!
//! Merges the speculative and agentic answers into the FINAL chunk,
//! deduplicates their source lists, and tracks response versions for
//! change deltas over a query's lifetime.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::agentic::PARTIAL_RESULTS_PREFIX;
use crate::model::{PathSource, Source};
use crate::text::lcs_ratio;

/// Fixed diagnostic rendering when neither path produced an answer.
pub const NO_RESPONSE_MESSAGE: &str =
    "Unable to process your query at this time. Please try again or rephrase your question.";

/// Text similarity at or above which the two answers are considered
/// the same and the agentic one wins outright.
const RESPONSE_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Confidence margin above which the agentic answer wins regardless of
/// similarity.
const CONFIDENCE_MARGIN: f32 = 0.15;

/// Version similarity below which content counts as changed.
const CONTENT_CHANGED_THRESHOLD: f32 = 0.95;

/// One path's contribution to a merge.
#[derive(Debug, Clone, Copy)]
pub struct PathAnswer<'a> {
    /// Answer text.
    pub text: &'a str,
    /// Answer confidence.
    pub confidence: f32,
}

/// Outcome of merging the two paths.
#[derive(Debug, Clone)]
pub struct MergedResponse {
    /// Merged answer text.
    pub text: String,
    /// Merged confidence.
    pub confidence: f32,
    /// Which path(s) the answer came from.
    pub path_used: PathSource,
}

/// Coordinates and merges responses from the two paths.
#[derive(Debug, Clone)]
pub struct ResponseCoordinator {
    similarity_threshold: f32,
}

impl Default for ResponseCoordinator {
    fn default() -> Self {
        Self::new(crate::model::SOURCE_EQUIVALENCE_THRESHOLD)
    }
}

impl ResponseCoordinator {
    /// Creates a coordinator with the given source-similarity
    /// threshold.
    #[must_use]
    pub const fn new(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Deduplicates a source list.
    ///
    /// Sorts by score descending and keeps the highest-scoring
    /// representative of each cluster; a source is dropped when its
    /// chunk id was already kept or its text is near-identical
    /// (LCS ratio at or above the threshold) to a kept source.
    #[must_use]
    pub fn dedup_sources(&self, sources: Vec<Source>) -> Vec<Source> {
        if sources.is_empty() {
            return sources;
        }

        let total = sources.len();
        let mut sorted = sources;
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept: Vec<Source> = Vec::with_capacity(sorted.len());
        for candidate in sorted {
            let duplicate = kept.iter().any(|existing| {
                existing.chunk_id == candidate.chunk_id
                    || lcs_ratio(&existing.text, &candidate.text) >= self.similarity_threshold
            });
            if !duplicate {
                kept.push(candidate);
            }
        }

        debug!(before = total, after = kept.len(), "source deduplication");
        kept
    }

    /// Merges and deduplicates the source lists from both paths.
    #[must_use]
    pub fn merge_sources(&self, speculative: Vec<Source>, agentic: Vec<Source>) -> Vec<Source> {
        let mut all = speculative;
        all.extend(agentic);
        self.dedup_sources(all)
    }

    /// Merges the two answers.
    ///
    /// The agentic answer is preferred when available (it embodies more
    /// evidence); a placeholder agentic answer is treated as absent;
    /// with neither present the fixed diagnostic message is returned at
    /// confidence 0.0.
    #[must_use]
    pub fn merge_responses(
        &self,
        speculative: Option<PathAnswer<'_>>,
        agentic: Option<PathAnswer<'_>>,
    ) -> MergedResponse {
        // A placeholder means the agentic path never really answered
        let agentic = agentic.filter(|a| !Self::is_placeholder(a.text));

        match (speculative, agentic) {
            (None, Some(agent)) => MergedResponse {
                text: agent.text.to_string(),
                confidence: agent.confidence,
                path_used: PathSource::Agentic,
            },
            (Some(spec), None) => MergedResponse {
                text: spec.text.to_string(),
                confidence: spec.confidence,
                path_used: PathSource::Speculative,
            },
            (None, None) => MergedResponse {
                text: NO_RESPONSE_MESSAGE.to_string(),
                confidence: 0.0,
                path_used: PathSource::Hybrid,
            },
            (Some(spec), Some(agent)) => {
                let similarity = lcs_ratio(spec.text, agent.text);
                if similarity >= RESPONSE_SIMILARITY_THRESHOLD {
                    info!(similarity, "answers agree, using agentic response");
                } else if agent.confidence > spec.confidence + CONFIDENCE_MARGIN {
                    info!(
                        agentic = agent.confidence,
                        speculative = spec.confidence,
                        "agentic confidence significantly higher"
                    );
                } else {
                    info!(similarity, "answers differ, using refined agentic response");
                }
                MergedResponse {
                    text: agent.text.to_string(),
                    confidence: agent.confidence,
                    path_used: PathSource::Hybrid,
                }
            }
        }
    }

    /// Recognizes agentic placeholder/timeout renderings.
    #[must_use]
    pub fn is_placeholder(text: &str) -> bool {
        text.trim().is_empty() || text.starts_with(PARTIAL_RESULTS_PREFIX)
    }
}

/// A committed response version.
#[derive(Debug, Clone)]
pub struct ResponseVersion {
    /// Identifier unique within the query (`v_001`, `v_002`, ...).
    pub version_id: String,
    /// Committed text.
    pub content: String,
    /// Path that produced the text.
    pub path_source: PathSource,
    /// Confidence at commit time.
    pub confidence: f32,
    /// Snapshot of the sources backing the text.
    pub sources: Vec<Source>,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
}

/// Delta between two response versions.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionDiff {
    /// Text similarity between the versions.
    pub similarity: f32,
    /// `true` when similarity falls below 0.95.
    pub content_changed: bool,
    /// Confidence change from the first to the second version.
    pub confidence_delta: f32,
    /// Chunk ids present only in the second version.
    pub sources_added: Vec<String>,
    /// Chunk ids present only in the first version.
    pub sources_removed: Vec<String>,
}

/// Append-only version history for one query.
///
/// Owned by the query's stream task and dropped with it; versions do
/// not outlive the query.
#[derive(Debug, Default)]
pub struct VersionLog {
    versions: Vec<ResponseVersion>,
}

impl VersionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits a version and returns its id.
    pub fn record(
        &mut self,
        content: &str,
        path_source: PathSource,
        confidence: f32,
        sources: &[Source],
    ) -> String {
        let version_id = format!("v_{:03}", self.versions.len() + 1);
        self.versions.push(ResponseVersion {
            version_id: version_id.clone(),
            content: content.to_string(),
            path_source,
            confidence,
            sources: sources.to_vec(),
            timestamp: Utc::now(),
        });
        version_id
    }

    /// All committed versions, oldest first.
    #[must_use]
    pub fn versions(&self) -> &[ResponseVersion] {
        &self.versions
    }

    /// Computes the delta between two committed versions.
    ///
    /// Returns `None` when either id is unknown.
    #[must_use]
    pub fn diff(&self, from_id: &str, to_id: &str) -> Option<VersionDiff> {
        let from = self.versions.iter().find(|v| v.version_id == from_id)?;
        let to = self.versions.iter().find(|v| v.version_id == to_id)?;

        let similarity = lcs_ratio(&from.content, &to.content);

        let from_ids: std::collections::HashSet<&str> =
            from.sources.iter().map(|s| s.chunk_id.as_str()).collect();
        let to_ids: std::collections::HashSet<&str> =
            to.sources.iter().map(|s| s.chunk_id.as_str()).collect();

        let mut sources_added: Vec<String> = to_ids
            .difference(&from_ids)
            .map(|s| (*s).to_string())
            .collect();
        let mut sources_removed: Vec<String> = from_ids
            .difference(&to_ids)
            .map(|s| (*s).to_string())
            .collect();
        sources_added.sort();
        sources_removed.sort();

        Some(VersionDiff {
            similarity,
            content_changed: similarity < CONTENT_CHANGED_THRESHOLD,
            confidence_delta: to.confidence - from.confidence,
            sources_added,
            sources_removed,
        })
    }
}
