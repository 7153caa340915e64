use serde::{Deserialize, Serialize};

/// Contributors of one branch, filtered to a cutoff and a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorStats {
    pub total_count: u32,
    pub recent_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCommits {
    /// Unix seconds of the week start (Sunday 00:00 UTC).
    pub week: i64,
    pub commits: u32,
}

/// Raw weekly commit counts for one contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorActivity {
    pub name: String,
    pub email: String,
    pub total_commits: u32,
    pub weeks: Vec<WeeklyCommits>,
}
