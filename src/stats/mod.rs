//! Contributor statistics: a primary tier of raw weekly counts per head
//! commit, and a shorter-lived secondary tier of filtered totals.

mod cache;
mod contributors;
mod coordinator;
mod git;

pub use cache::{CacheStore, MemoryCache, get_json, put_json};
pub use contributors::{
    ContributorStatsCache, PrimaryStats, StatsGenerator, StatsLookup, StatsSource, secondary_key,
    summarize,
};
pub use coordinator::{CacheCoordinator, ComputeGuard};
pub use git::{GitStatsGenerator, repo_path, week_start};
