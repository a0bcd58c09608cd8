//! Text similarity and truncation helpers.
//!
//! The similarity measure used throughout the engine (source
//! deduplication, response merging, version deltas) is a normalized
//! longest-common-subsequence ratio over characters.

use unicode_segmentation::UnicodeSegmentation;

/// Computes the normalized LCS similarity ratio between two strings.
///
/// Defined as `2·LCS(a, b) / (|a| + |b|)` over characters, yielding a
/// value in `[0, 1]`: `1.0` for identical strings, `0.0` for strings
/// with no characters in common. Two empty strings are identical.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn lcs_ratio(a: &str, b: &str) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let lcs = lcs_length(&a_chars, &b_chars);
    (2.0 * lcs as f32) / (a_chars.len() + b_chars.len()) as f32
}

/// Longest common subsequence length via the classic DP with a rolling
/// row, keeping memory at `O(min(|a|, |b|))`.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    // Iterate over the longer sequence, keep the row for the shorter one
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];

    for &oc in outer {
        for (j, &ic) in inner.iter().enumerate() {
            curr[j + 1] = if oc == ic {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[inner.len()]
}

/// Truncates text to at most `max_graphemes` grapheme clusters,
/// appending an ellipsis when anything was cut.
///
/// Grapheme-aware so multi-byte scripts (Korean, emoji) are never split
/// mid-cluster.
#[must_use]
pub fn truncate(text: &str, max_graphemes: usize) -> String {
    let mut iter = text.grapheme_indices(true);
    match iter.nth(max_graphemes) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcs_ratio_identical() {
        assert!((lcs_ratio("hello world", "hello world") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lcs_ratio_disjoint() {
        assert!(lcs_ratio("abc", "xyz").abs() < f32::EPSILON);
    }

    #[test]
    fn test_lcs_ratio_empty() {
        assert!((lcs_ratio("", "") - 1.0).abs() < f32::EPSILON);
        assert!(lcs_ratio("abc", "").abs() < f32::EPSILON);
        assert!(lcs_ratio("", "abc").abs() < f32::EPSILON);
    }

    #[test]
    fn test_lcs_ratio_partial() {
        // LCS("abcd", "abed") = "abd" (3), ratio = 6/8 = 0.75
        let ratio = lcs_ratio("abcd", "abed");
        assert!((ratio - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_lcs_ratio_symmetric() {
        let a = "machine learning improves accuracy";
        let b = "machine learning greatly improves recall";
        assert!((lcs_ratio(a, b) - lcs_ratio(b, a)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lcs_ratio_near_duplicate_above_threshold() {
        let a = "The quick brown fox jumps over the lazy dog near the river bank.";
        let b = "The quick brown fox jumps over the lazy dog near the river bend.";
        assert!(lcs_ratio(a, b) >= 0.85);
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_cuts_with_ellipsis() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn test_truncate_grapheme_safe() {
        // Korean syllable blocks must not be split mid-cluster
        let text = "안녕하세요 세계";
        let cut = truncate(text, 3);
        assert_eq!(cut, "안녕하...");
    }

    #[test]
    fn test_truncate_empty() {
        assert_eq!(truncate("", 10), "");
    }
}
