//! Query complexity analysis for mode routing.
//!
//! Scores a query on four axes (length, keywords, structure, question
//! type) and recommends a processing mode. Pure and deterministic: the
//! same query always produces the same report.

pub mod query_type;

pub use query_type::{QueryKind, QueryTypeAnalyzer, QueryTypeReport};

use regex::Regex;

use crate::model::QueryMode;

/// Query complexity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    /// Short factual query; the fast path suffices.
    Simple,
    /// Moderate query; progressive refinement pays off.
    Moderate,
    /// Analytical query; full reasoning is warranted.
    Complex,
}

impl ComplexityLevel {
    /// Returns the stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analytical keywords indicating a deep query (English + Korean).
const DEEP_KEYWORDS: &[&str] = &[
    "compare",
    "contrast",
    "analyze",
    "evaluate",
    "assess",
    "critique",
    "synthesize",
    "justify",
    "argue",
    "debate",
    "implications",
    "비교",
    "대조",
    "분석",
    "평가",
    "비판",
    "종합",
    "정당화",
    "논증",
    "토론",
    "시사점",
];

/// Factual keywords indicating a simple lookup (English + Korean).
const FACTUAL_KEYWORDS: &[&str] = &[
    "what", "who", "when", "where", "which", "define", "list", "무엇", "누구", "언제", "어디",
    "어느", "정의", "나열",
];

/// Analytical question-type markers (English + Korean).
const ANALYTICAL_PATTERNS: &[&str] = &[
    "compare", "contrast", "analyze", "evaluate", "assess", "비교", "대조", "분석", "평가",
];

/// Explanatory question-type markers (English + Korean).
const EXPLANATORY_PATTERNS: &[&str] = &["how", "why", "어떻게", "왜"];

/// Result of complexity analysis.
#[derive(Debug, Clone)]
pub struct ComplexityReport {
    /// Classified complexity level.
    pub level: ComplexityLevel,
    /// Recommended processing mode (never `Auto`).
    pub recommended_mode: QueryMode,
    /// Confidence in the recommendation, in `[0, 1]`.
    pub confidence: f32,
    /// Weighted composite score in `[0, 1]`.
    pub composite: f32,
    /// Length sub-score.
    pub length_score: f32,
    /// Keyword sub-score.
    pub keyword_score: f32,
    /// Structure sub-score.
    pub structure_score: f32,
    /// Question-type sub-score.
    pub question_type_score: f32,
    /// Human-readable factors behind the classification.
    pub factors: Vec<String>,
}

impl ComplexityReport {
    /// Human-readable explanation of the recommended mode, suitable for
    /// surfacing to the caller.
    #[must_use]
    pub fn mode_explanation(&self) -> String {
        let factors = self.factors.join(", ");
        match self.recommended_mode {
            QueryMode::Fast => format!(
                "Recommended FAST mode (~2s): your query appears to be factual and \
                 straightforward. Factors: {factors}"
            ),
            QueryMode::Balanced => format!(
                "Recommended BALANCED mode (~5s): your query requires moderate analysis. \
                 You'll get a quick initial answer with progressive refinement. \
                 Factors: {factors}"
            ),
            _ => format!(
                "Recommended DEEP mode (~10-15s): your query requires comprehensive \
                 analysis. The system will perform deep reasoning for the best answer. \
                 Factors: {factors}"
            ),
        }
    }
}

/// Analyzes query complexity and recommends a processing mode.
///
/// Heuristics: query length, analytical vs factual keywords, sentence
/// structure, and question type, each scored in `[0, 1]` and combined
/// with fixed weights (0.2 / 0.4 / 0.2 / 0.2).
#[derive(Debug)]
pub struct ComplexityAnalyzer {
    simple_regex: Regex,
    complex_regex: Regex,
    conjunction_regex: Regex,
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplexityAnalyzer {
    /// Creates an analyzer with the built-in English + Korean pattern
    /// inventories. Support for other scripts is out of scope.
    ///
    /// # Panics
    ///
    /// Never panics; the patterns are fixed and known-valid.
    #[must_use]
    #[allow(clippy::missing_panics_doc, clippy::unwrap_used)]
    pub fn new() -> Self {
        let simple = r"(?i)\b(what is|who is|when|where|which|define|list)\b|(무엇|누구|언제|어디|어느|정의|나열)";
        let complex = r"(?i)\b(compare|contrast|analyze|evaluate|assess|explain why|how does)\b|\b(advantages? and disadvantages?|pros? and cons?)\b|(비교|대조|분석|평가|설명|이유|어떻게|장단점|장점과 단점)";
        let conjunction = r"(?i)\b(and|or|but)\b|(그리고|또는|하지만)";

        Self {
            simple_regex: Regex::new(simple).unwrap(),
            complex_regex: Regex::new(complex).unwrap(),
            conjunction_regex: Regex::new(conjunction).unwrap(),
        }
    }

    /// Analyzes a query and produces a [`ComplexityReport`].
    ///
    /// An empty query classifies as SIMPLE with confidence 0.0 (the
    /// router rejects empty queries upstream; this keeps the analyzer
    /// total).
    #[must_use]
    pub fn analyze(&self, query: &str) -> ComplexityReport {
        if query.trim().is_empty() {
            return ComplexityReport {
                level: ComplexityLevel::Simple,
                recommended_mode: QueryMode::Fast,
                confidence: 0.0,
                composite: 0.0,
                length_score: 0.0,
                keyword_score: 0.0,
                structure_score: 0.0,
                question_type_score: 0.0,
                factors: vec!["Empty query".to_string()],
            };
        }

        let length_score = Self::length_score(query);
        let keyword_score = self.keyword_score(query);
        let structure_score = self.structure_score(query);
        let question_type_score = Self::question_type_score(query);

        let composite = 0.2 * length_score
            + 0.4 * keyword_score
            + 0.2 * structure_score
            + 0.2 * question_type_score;

        let (level, recommended_mode, confidence) = if composite < 0.35 {
            (ComplexityLevel::Simple, QueryMode::Fast, 0.85)
        } else if composite < 0.65 {
            (ComplexityLevel::Moderate, QueryMode::Balanced, 0.90)
        } else {
            (ComplexityLevel::Complex, QueryMode::Deep, 0.80)
        };

        let factors = Self::factors(
            query,
            keyword_score,
            structure_score,
            question_type_score,
        );

        ComplexityReport {
            level,
            recommended_mode,
            confidence,
            composite,
            length_score,
            keyword_score,
            structure_score,
            question_type_score,
            factors,
        }
    }

    /// Length score: `< 10` words → 0.0, `< 25` → 0.5, else 1.0.
    fn length_score(query: &str) -> f32 {
        let word_count = query.split_whitespace().count();
        if word_count < 10 {
            0.0
        } else if word_count < 25 {
            0.5
        } else {
            1.0
        }
    }

    /// Keyword score from the analytical/factual inventories, with the
    /// regex patterns as a fallback signal.
    fn keyword_score(&self, query: &str) -> f32 {
        let lower = query.to_lowercase();

        let deep_count = DEEP_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();
        if deep_count >= 2 {
            return 1.0;
        }
        if deep_count == 1 {
            return 0.7;
        }

        let factual_count = FACTUAL_KEYWORDS
            .iter()
            .filter(|kw| lower.contains(*kw))
            .count();
        if factual_count >= 1 {
            return 0.2;
        }

        if self.complex_regex.is_match(query) {
            return 0.8;
        }
        if self.simple_regex.is_match(query) {
            return 0.1;
        }

        0.5
    }

    /// Structure score from sentence, question-mark, and conjunction
    /// counts.
    fn structure_score(&self, query: &str) -> f32 {
        let sentence_count = query
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count();

        // English and full-width question marks
        let question_count =
            query.matches('?').count() + query.matches('？').count();

        let conjunction_count = self.conjunction_regex.find_iter(query).count();

        if sentence_count > 2 || question_count > 1 {
            1.0
        } else if conjunction_count >= 2 {
            0.7
        } else if conjunction_count == 1 {
            0.4
        } else {
            0.2
        }
    }

    /// Question-type score: analytical 0.9, explanatory 0.5, factual
    /// 0.2, otherwise 0.5.
    fn question_type_score(query: &str) -> f32 {
        let lower = query.to_lowercase();

        if ANALYTICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
            return 0.9;
        }
        if EXPLANATORY_PATTERNS.iter().any(|p| lower.contains(p)) {
            return 0.5;
        }
        if FACTUAL_KEYWORDS.iter().any(|p| lower.contains(p)) {
            return 0.2;
        }

        0.5
    }

    /// Builds the human-readable factor list.
    fn factors(
        query: &str,
        keyword_score: f32,
        structure_score: f32,
        question_type_score: f32,
    ) -> Vec<String> {
        let mut factors = Vec::new();

        let word_count = query.split_whitespace().count();
        if word_count < 10 {
            factors.push(format!("Short query ({word_count} words)"));
        } else if word_count > 25 {
            factors.push(format!("Long query ({word_count} words)"));
        }

        if keyword_score > 0.7 {
            factors.push("Contains analytical keywords (compare, analyze, evaluate)".to_string());
        } else if keyword_score < 0.3 {
            factors.push("Contains factual keywords (what, who, when)".to_string());
        }

        if structure_score > 0.7 {
            factors.push("Complex structure (multiple sentences or questions)".to_string());
        } else if structure_score < 0.3 {
            factors.push("Simple structure (single sentence)".to_string());
        }

        if question_type_score > 0.7 {
            factors.push("Analytical question type".to_string());
        } else if question_type_score < 0.3 {
            factors.push("Factual question type".to_string());
        }

        if factors.is_empty() {
            factors.push("Moderate complexity query".to_string());
        }
        factors
    }
}
