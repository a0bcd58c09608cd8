//! Reciprocal Rank Fusion (RRF).
//!
//! Combines multiple ranked candidate lists into a single fused
//! ranking. Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal
//! Rank Fusion outperforms Condorcet and individual Rank Learning
//! Methods".

use std::collections::HashMap;

/// Configuration for the RRF algorithm.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// The k parameter controls how much weight lower-ranked items
    /// receive. Default is 60, the value recommended in the original
    /// paper.
    pub k: u32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

impl RrfConfig {
    /// Creates a config with the specified k value.
    #[must_use]
    pub const fn new(k: u32) -> Self {
        Self { k }
    }
}

/// Performs Reciprocal Rank Fusion on ranked chunk-id lists.
///
/// The RRF score for each chunk is `score(d) = Σ 1 / (k + rank(d))`,
/// summed over every list that contains the chunk (absent lists
/// contribute nothing).
///
/// # Arguments
///
/// * `ranked_lists` - Candidate lists ordered most-relevant first.
/// * `config` - RRF configuration (k parameter).
///
/// # Returns
///
/// `(chunk_id, rrf_score)` pairs sorted by score descending. Ties
/// break lexicographically by chunk id for determinism.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn reciprocal_rank_fusion(ranked_lists: &[&[&str]], config: &RrfConfig) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();

    for list in ranked_lists {
        for (rank, &chunk_id) in list.iter().enumerate() {
            // rank is 0-indexed; the formula expects 1-indexed ranks
            let rrf_score = 1.0 / f64::from(config.k + (rank as u32) + 1);
            *scores.entry(chunk_id).or_insert(0.0) += rrf_score;
        }
    }

    let mut results: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();

    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrf_single_list() {
        let list = ["a", "b", "c"];
        let results = reciprocal_rank_fusion(&[&list], &RrfConfig::default());

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 > results[1].1);
        assert!(results[1].1 > results[2].1);
    }

    #[test]
    fn test_rrf_multiple_lists() {
        let list1 = ["a", "b", "c"];
        let list2 = ["c", "b", "a"];
        let results = reciprocal_rank_fusion(&[&list1, &list2], &RrfConfig::default());

        assert_eq!(results.len(), 3);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(ids.contains(&"c"));
    }

    #[test]
    fn test_rrf_agreement_wins() {
        // "b" is ranked first in both lists; it must come out on top
        let list1 = ["b", "a"];
        let list2 = ["b", "c"];
        let results = reciprocal_rank_fusion(&[&list1, &list2], &RrfConfig::default());
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn test_rrf_score_formula() {
        let list = ["only"];
        let results = reciprocal_rank_fusion(&[&list], &RrfConfig::new(60));
        let expected = 1.0 / 61.0;
        assert!((results[0].1 - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rrf_combined_score() {
        let list1 = ["x"];
        let list2 = ["x"];
        let results = reciprocal_rank_fusion(&[&list1, &list2], &RrfConfig::new(60));
        let expected = 2.0 / 61.0;
        assert!((results[0].1 - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rrf_empty_lists() {
        let list: [&str; 0] = [];
        let results = reciprocal_rank_fusion(&[&list], &RrfConfig::default());
        assert!(results.is_empty());
    }

    #[test]
    fn test_rrf_tie_breaks_by_id() {
        // Disjoint lists, same ranks: scores tie, ids break the tie
        let list1 = ["zeta"];
        let list2 = ["alpha"];
        let results = reciprocal_rank_fusion(&[&list1, &list2], &RrfConfig::default());
        assert_eq!(results[0].0, "alpha");
        assert_eq!(results[1].0, "zeta");
    }

    #[test]
    fn test_rrf_k_parameter() {
        let list = ["a", "b"];
        let low = reciprocal_rank_fusion(&[&list], &RrfConfig::new(1));
        let high = reciprocal_rank_fusion(&[&list], &RrfConfig::new(100));

        // Lower k spreads ranks further apart
        let diff_low = low[0].1 - low[1].1;
        let diff_high = high[0].1 - high[1].1;
        assert!(diff_low > diff_high);
    }

    #[test]
    fn test_rrf_config_default() {
        assert_eq!(RrfConfig::default().k, 60);
    }
}
