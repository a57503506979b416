//! Match result types.

use std::cmp::Ordering;

use crate::normalize::NormalizedName;
use crate::pulldb::Pull;

/// Score of one candidate filename against one pull.
///
/// Results order by `(issue_mismatch, weighted_distance)`: a result with a
/// matching issue number always beats one without, however close the names.
#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    /// Whether the trailing issue numbers differ.
    pub issue_mismatch: bool,
    /// Edit distance divided by the shorter canonical length.
    pub weighted_distance: f64,
    /// The pull this candidate was scored against.
    pub pull: &'a Pull,
    pub normalized_pull: NormalizedName,
    pub normalized_candidate: NormalizedName,
}

impl MatchResult<'_> {
    /// Whether the match is good enough for automated action.
    pub fn is_acceptable(&self, threshold: f64) -> bool {
        !self.issue_mismatch && self.weighted_distance < threshold
    }

    /// Compare by `(issue_mismatch, weighted_distance)`.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.issue_mismatch
            .cmp(&other.issue_mismatch)
            .then_with(|| self.weighted_distance.total_cmp(&other.weighted_distance))
    }
}
