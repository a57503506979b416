//! Fuzzy matching of archive filenames against pull titles.
//!
//! Both names are normalized, then compared with a Levenshtein distance
//! weighted by the shorter string's length. On short strings even a small
//! edit count is a large difference, so raw distances are not comparable
//! across titles of different lengths.

mod types;

pub use types::MatchResult;

use tracing::warn;

use crate::normalize::{NameNormalizer, NormalizedName};
use crate::pulldb::Pull;

/// Scores candidates against pulls.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    normalizer: NameNormalizer,
}

impl Matcher {
    /// Create a matcher with the default normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a matcher with a custom normalizer (e.g. a different rewrite table).
    pub fn with_normalizer(normalizer: NameNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }

    /// Score an already normalized candidate against one pull.
    ///
    /// Returns `None` when the pull has no name; such pulls are left out of
    /// the comparison rather than given an infinite distance.
    pub fn score<'a>(
        &self,
        candidate: &NormalizedName,
        pull: &'a Pull,
    ) -> Option<MatchResult<'a>> {
        let Some(name) = pull.name.as_deref() else {
            warn!(pull_id = pull.id, "Pull has no name, skipping");
            return None;
        };
        let normalized_pull = self.normalizer.normalize(name);
        let weighted_distance =
            weighted_distance(&normalized_pull.canonical, &candidate.canonical);

        Some(MatchResult {
            issue_mismatch: candidate.issue_number != normalized_pull.issue_number,
            weighted_distance,
            pull,
            normalized_pull,
            normalized_candidate: candidate.clone(),
        })
    }

    /// Score a raw filename against every named pull.
    pub fn compare<'a>(&self, filename: &str, pulls: &'a [Pull]) -> Vec<MatchResult<'a>> {
        let candidate = self.normalizer.normalize(filename);
        pulls
            .iter()
            .filter_map(|pull| self.score(&candidate, pull))
            .collect()
    }

    /// Best pull for a raw filename, or `None` when there is nothing to compare.
    pub fn best_match<'a>(&self, filename: &str, pulls: &'a [Pull]) -> Option<MatchResult<'a>> {
        best_of(self.compare(filename, pulls))
    }
}

/// Minimum of a result set under `(issue_mismatch, weighted_distance)`.
pub fn best_of<'a, I>(results: I) -> Option<MatchResult<'a>>
where
    I: IntoIterator<Item = MatchResult<'a>>,
{
    results.into_iter().min_by(|a, b| a.rank(b))
}

/// Levenshtein distance divided by `max(1, min(len(a), len(b)))`.
pub fn weighted_distance(a: &str, b: &str) -> f64 {
    let min_length = a.chars().count().min(b.chars().count()).max(1);
    levenshtein_distance(a, b) as f64 / min_length as f64
}

/// Calculate Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Two rolling rows of the full matrix
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulls() -> Vec<Pull> {
        vec![
            Pull::new(1000, "Test Issue 1", 0.1),
            Pull::new(1001, "Test Issue 2", 0.2),
            Pull::new(1002, "Test Issue 3", 0.3),
            Pull::new(1003, "Another Title 5", 0.4),
            Pull::new(1004, "Test Issue 5", 0.5),
        ]
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("rachmaninov", "rahmaninov"), 1);
    }

    #[test]
    fn test_weighted_distance() {
        assert_eq!(weighted_distance("superman", "superman"), 0.0);
        assert!(weighted_distance("spider-man", "supergirl") > 0.5);
        // Empty strings do not divide by zero
        assert_eq!(weighted_distance("", ""), 0.0);
        assert_eq!(weighted_distance("", "abc"), 3.0);
    }

    #[test]
    fn test_weighted_distance_is_zero_on_identity() {
        for name in ["saga 43", "the walking dead #12", "a", ""] {
            assert_eq!(weighted_distance(name, name), 0.0);
        }
    }

    #[test]
    fn test_exact_match_wins() {
        let matcher = Matcher::new();
        let pulls = pulls();

        let best = matcher.best_match("Test Issue 1 (2014).cbr", &pulls).unwrap();
        assert!(!best.issue_mismatch);
        assert_eq!(best.weighted_distance, 0.0);
        assert_eq!(best.pull.id, 1000);

        let best = matcher.best_match("Test Issue 5", &pulls).unwrap();
        assert_eq!(best.pull.id, 1004);
        assert_eq!(best.weighted_distance, 0.0);
    }

    #[test]
    fn test_issue_match_beats_closer_name() {
        let matcher = Matcher::new();
        let pulls = pulls();

        let best = matcher.best_match("dummy 5", &pulls).unwrap();
        assert!(!best.issue_mismatch);
        assert!(best.weighted_distance > 0.0);
        assert!(best.pull.id == 1003 || best.pull.id == 1004);
    }

    #[test]
    fn test_nameless_pulls_are_skipped() {
        let matcher = Matcher::new();
        let mut pulls = pulls();
        pulls[0].name = None;

        let results = matcher.compare("test issue 5", &pulls);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.pull.id != 1000));
    }

    #[test]
    fn test_empty_candidate_set_is_no_match() {
        let matcher = Matcher::new();
        assert!(matcher.compare("test issue 5", &[]).is_empty());
        assert!(matcher.best_match("test issue 5", &[]).is_none());
    }

    #[test]
    fn test_acceptable_requires_issue_match_and_threshold() {
        let matcher = Matcher::new();
        let pulls = vec![Pull::new(1, "Saga 43", 0.0)];

        let exact = matcher.best_match("Saga_043.cbz", &pulls).unwrap();
        assert!(exact.is_acceptable(0.25));

        let wrong_issue = matcher.best_match("Saga 44", &pulls).unwrap();
        assert!(wrong_issue.issue_mismatch);
        assert!(!wrong_issue.is_acceptable(0.25));

        let far = matcher.best_match("Sage Against 43", &pulls).unwrap();
        assert!(!far.issue_mismatch);
        assert!(!far.is_acceptable(0.2));
    }

    #[test]
    fn test_rank_orders_mismatch_first() {
        let pull = Pull::new(1, "x", 0.0);
        let name = NormalizedName {
            canonical: "x".to_string(),
            issue_number: String::new(),
        };
        let matched_far = MatchResult {
            issue_mismatch: false,
            weighted_distance: 0.9,
            pull: &pull,
            normalized_pull: name.clone(),
            normalized_candidate: name.clone(),
        };
        let mismatched_close = MatchResult {
            issue_mismatch: true,
            weighted_distance: 0.0,
            ..matched_far.clone()
        };

        let best = best_of(vec![mismatched_close, matched_far]).unwrap();
        assert!(!best.issue_mismatch);
        assert_eq!(best.weighted_distance, 0.9);
    }
}
