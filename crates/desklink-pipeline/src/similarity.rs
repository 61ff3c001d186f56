/// Trait contract for `SimilarityScorer` behavior.
///
/// The pipeline only depends on this seam, so the weak character-overlap
/// metric can be replaced by edit distance or embeddings without touching
/// callers.
pub trait SimilarityScorer: Send + Sync {
    /// Returns a similarity in [0.0, 1.0]; 1.0 means an exact
    /// (case-insensitive) match.
    fn similarity(&self, left: &str, right: &str) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
/// Case-insensitive longest-common-character-ratio scorer.
///
/// Counts how many characters of the shorter string (with multiplicity) occur
/// in the longer one and normalizes by the longer string's length. The count
/// is intentionally non-symmetric to preserve the historical matching
/// behavior of stored tag mappings.
pub struct CharOverlapScorer;

impl SimilarityScorer for CharOverlapScorer {
    fn similarity(&self, left: &str, right: &str) -> f64 {
        let left: Vec<char> = left.trim().to_lowercase().chars().collect();
        let right: Vec<char> = right.trim().to_lowercase().chars().collect();
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }

        let (shorter, longer) = if left.len() <= right.len() {
            (&left, &right)
        } else {
            (&right, &left)
        };

        let mut used = vec![false; longer.len()];
        let mut matched = 0_usize;
        for ch in shorter.iter() {
            if let Some(slot) = longer
                .iter()
                .enumerate()
                .position(|(index, candidate)| !used[index] && candidate == ch)
            {
                used[slot] = true;
                matched += 1;
            }
        }

        matched as f64 / longer.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::{CharOverlapScorer, SimilarityScorer};

    #[test]
    fn unit_identical_strings_score_one() {
        let scorer = CharOverlapScorer;
        assert_eq!(scorer.similarity("bug", "BUG"), 1.0);
    }

    #[test]
    fn unit_disjoint_strings_score_zero() {
        let scorer = CharOverlapScorer;
        assert_eq!(scorer.similarity("abc", "xyz"), 0.0);
        assert_eq!(scorer.similarity("", "bug"), 0.0);
    }

    #[test]
    fn unit_ratio_normalizes_by_longer_length() {
        let scorer = CharOverlapScorer;
        // "bug" fully contained in "buggy" (5 chars) -> 3/5.
        let score = scorer.similarity("bug", "buggy");
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn regression_multiplicity_is_respected() {
        let scorer = CharOverlapScorer;
        // "aa" against "abc": only one 'a' available -> 1/3.
        let score = scorer.similarity("aa", "abc");
        assert!((score - (1.0 / 3.0)).abs() < 1e-9);
    }
}
