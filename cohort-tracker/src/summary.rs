use modwatch_core::CombinedRecord;
use std::collections::BTreeSet;
use std::fmt;

/// Headline numbers for a completed Pass 2.
///
/// Rates are means over the rows whose final status is known; a rate is
/// `None` when no row in the cohort was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortSummary {
    pub total_posts: usize,
    pub resolved_posts: usize,
    pub subreddits: usize,
    pub official_removal_rate: Option<f64>,
    pub inferred_removal_rate: Option<f64>,
    pub locked_rate: Option<f64>,
}

impl CohortSummary {
    pub fn from_records(records: &[CombinedRecord]) -> Self {
        let subreddits: BTreeSet<&str> = records.iter().map(|r| r.subreddit.as_str()).collect();

        Self {
            total_posts: records.len(),
            resolved_posts: records.iter().filter(|r| r.is_resolved()).count(),
            subreddits: subreddits.len(),
            official_removal_rate: rate(records.iter().map(|r| r.is_removed_official)),
            inferred_removal_rate: rate(records.iter().map(|r| r.is_removed_inferred)),
            locked_rate: rate(records.iter().map(|r| r.is_locked)),
        }
    }
}

fn rate(flags: impl Iterator<Item = Option<bool>>) -> Option<f64> {
    let (known, hits) = flags
        .flatten()
        .fold((0usize, 0usize), |(known, hits), flag| {
            (known + 1, hits + usize::from(flag))
        });
    (known > 0).then(|| hits as f64 / known as f64)
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for CohortSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total posts: {}", self.total_posts)?;
        writeln!(f, "Re-checked: {}", self.resolved_posts)?;
        writeln!(f, "Subreddits: {}", self.subreddits)?;
        writeln!(f, "Removed (official): {}", percent(self.official_removal_rate))?;
        writeln!(f, "Removed (inferred): {}", percent(self.inferred_removal_rate))?;
        write!(f, "Locked: {}", percent(self.locked_rate))
    }
}
