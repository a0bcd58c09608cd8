//! Query-type classification for search strategy selection.
//!
//! Decides whether a query benefits from hybrid (vector + lexical)
//! retrieval: queries carrying version numbers, error codes, acronyms,
//! code snippets, CLI flags, or explicit comparisons need exact term
//! matching that pure vector search misses.

use regex::Regex;

/// Classified query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Exact terms matter: versions, error codes, identifiers.
    Keyword,
    /// Conceptual question; vector search suffices.
    Semantic,
    /// Asks to compare alternatives.
    Comparison,
    /// Code, APIs, configuration.
    Technical,
}

impl QueryKind {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Comparison => "comparison",
            Self::Technical => "technical",
        }
    }
}

/// Result of query-type analysis.
#[derive(Debug, Clone)]
pub struct QueryTypeReport {
    /// The highest-scoring kind.
    pub kind: QueryKind,
    /// Score of the winning kind, in `[0, 1]`.
    pub confidence: f32,
    /// Whether hybrid retrieval is recommended.
    pub use_hybrid: bool,
    /// One-line explanation of the classification.
    pub reasoning: &'static str,
}

/// Classifies queries to pick the retrieval strategy.
#[derive(Debug)]
pub struct QueryTypeAnalyzer {
    keyword_patterns: Vec<Regex>,
    comparison_patterns: Vec<Regex>,
    technical_patterns: Vec<Regex>,
    semantic_patterns: Vec<Regex>,
}

impl Default for QueryTypeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryTypeAnalyzer {
    /// Creates an analyzer with the built-in pattern sets.
    ///
    /// # Panics
    ///
    /// Never panics; the patterns are fixed and known-valid.
    #[must_use]
    #[allow(clippy::missing_panics_doc, clippy::unwrap_used)]
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
        };

        Self {
            keyword_patterns: compile(&[
                r"\d+\.\d+(\.\d+)?",               // version numbers: 3.11, 1.0.0
                r"error\s*\d+|exception|traceback", // error codes
                r"[A-Z]{2,}(?:\s+[A-Z]{2,})*",     // acronyms: API, HTTP
                r#"`[^`]+`|"[^"]+""#,              // code snippets
                r"--\w+|\s-\w",                    // CLI flags
            ]),
            comparison_patterns: compile(&[
                r"\bvs\b|\bversus\b",
                r"\bcompare\b|\bcomparison\b",
                r"\bdifference\b|\bdifferent\b",
                r"\bbetter\b|\bworse\b",
            ]),
            technical_patterns: compile(&[
                r"\bfunction\b|\bmethod\b|\bclass\b",
                r"\bimport\b|\bexport\b",
                r"\bapi\b|\bsdk\b|\bcli\b",
                r"\bconfig\b|\bconfiguration\b",
                r"\binstall\b|\bsetup\b",
            ]),
            semantic_patterns: compile(&[
                r"\bwhat\s+is\b|\bwhat\s+are\b",
                r"\bhow\s+does\b|\bhow\s+do\b",
                r"\bwhy\b|\bexplain\b",
                r"\bunderstand\b|\bconcept\b",
                r"\blearn\b|\bteach\b",
            ]),
        }
    }

    /// Classifies a query and recommends whether to use hybrid
    /// retrieval.
    #[must_use]
    pub fn analyze(&self, query: &str) -> QueryTypeReport {
        let lower = query.to_lowercase();

        let keyword = Self::score_keyword(&self.keyword_patterns, query);
        let comparison = Self::score_patterns(&self.comparison_patterns, &lower, 0.0, 0.4);
        let technical = Self::score_patterns(&self.technical_patterns, &lower, 0.0, 0.25);
        let semantic = Self::score_patterns(&self.semantic_patterns, &lower, 0.3, 0.2);

        // First maximal entry wins; ties resolve in declaration order
        let mut kind = QueryKind::Keyword;
        let mut confidence = keyword;
        for (k, s) in [
            (QueryKind::Comparison, comparison),
            (QueryKind::Technical, technical),
            (QueryKind::Semantic, semantic),
        ] {
            if s > confidence {
                kind = k;
                confidence = s;
            }
        }

        let use_hybrid = matches!(
            kind,
            QueryKind::Keyword | QueryKind::Comparison | QueryKind::Technical
        );

        let reasoning = match kind {
            QueryKind::Keyword => {
                "Query contains specific terms, versions, or codes requiring exact matching"
            }
            QueryKind::Comparison => "Query asks for comparison between options",
            QueryKind::Technical => "Query involves technical terms or code",
            QueryKind::Semantic => "Query is conceptual and benefits from semantic understanding",
        };

        QueryTypeReport {
            kind,
            confidence,
            use_hybrid,
            reasoning,
        }
    }

    /// Keyword scoring runs against the original-case query (acronyms)
    /// and boosts when multiple indicator classes match.
    fn score_keyword(patterns: &[Regex], query: &str) -> f32 {
        let matches = patterns.iter().filter(|p| p.is_match(query)).count();
        #[allow(clippy::cast_precision_loss)]
        let mut score = matches as f32 * 0.3;
        if matches > 1 {
            score += 0.2;
        }
        score.min(1.0)
    }

    fn score_patterns(patterns: &[Regex], lower: &str, base: f32, per_match: f32) -> f32 {
        let matches = patterns.iter().filter(|p| p.is_match(lower)).count();
        #[allow(clippy::cast_precision_loss)]
        let score = base + matches as f32 * per_match;
        score.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("How do I fix error 404 in nginx 1.25.3?", true; "version and error code")]
    #[test_case("python 3.11 breaking changes", true; "version number")]
    #[test_case("What is the `--verbose` flag for?", true; "cli flag")]
    #[test_case("REST vs GraphQL, which is better?", true; "comparison")]
    #[test_case("install and configure the SDK", true; "technical")]
    fn test_hybrid_recommended(query: &str, expected: bool) {
        let analyzer = QueryTypeAnalyzer::new();
        assert_eq!(analyzer.analyze(query).use_hybrid, expected);
    }

    #[test]
    fn test_conceptual_query_stays_semantic() {
        let analyzer = QueryTypeAnalyzer::new();
        let report = analyzer.analyze("explain why attention helps models understand context");
        assert_eq!(report.kind, QueryKind::Semantic);
        assert!(!report.use_hybrid);
    }

    #[test]
    fn test_comparison_beats_semantic() {
        let analyzer = QueryTypeAnalyzer::new();
        let report = analyzer.analyze("difference between tokio and async-std, which is better");
        assert_eq!(report.kind, QueryKind::Comparison);
        assert!(report.use_hybrid);
    }

    #[test]
    fn test_confidence_in_range() {
        let analyzer = QueryTypeAnalyzer::new();
        for query in [
            "what is rust",
            "API SDK CLI 1.2.3 `code`",
            "compare compare compare",
        ] {
            let report = analyzer.analyze(query);
            assert!((0.0..=1.0).contains(&report.confidence));
        }
    }

    #[test]
    fn test_reasoning_nonempty() {
        let analyzer = QueryTypeAnalyzer::new();
        assert!(!analyzer.analyze("anything").reasoning.is_empty());
    }
}
