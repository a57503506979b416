//! Weight-ordered reading report.

use crate::cache::keys::SEEN_SET;
use crate::cache::{CacheError, PresenceCache};
use crate::pulldb::Pull;

/// One report line.
///
/// `*` marks pulls with no located artifact yet. The stream is right aligned
/// and cut to eight characters.
pub fn report_line(pull: &Pull, seen: bool) -> String {
    format!(
        "{:07.0}{} {:6} [{:>8.8}] {} {}",
        pull.weight * 1e6,
        if seen { ' ' } else { '*' },
        pull.id,
        pull.stream_id.as_deref().unwrap_or("None"),
        pull.pubdate
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        pull.name.as_deref().unwrap_or_default(),
    )
}

/// Report lines for `pulls`, lowest weight first.
pub fn report(pulls: &[Pull], cache: &dyn PresenceCache) -> Result<Vec<String>, CacheError> {
    let mut ordered: Vec<&Pull> = pulls.iter().collect();
    ordered.sort_by(|a, b| a.weight.total_cmp(&b.weight).then(a.id.cmp(&b.id)));

    ordered
        .into_iter()
        .map(|pull| {
            let seen = cache.is_member(SEEN_SET, &pull.id.to_string())?;
            Ok(report_line(pull, seen))
        })
        .collect()
}
