use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::cache::{CacheStore, get_json, put_json};
use super::coordinator::CacheCoordinator;
use crate::error::Result;
use crate::types::{ContributorActivity, ContributorStats, Repo};

pub const SECONDS_PER_DAY: i64 = 86_400;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// Primary-tier answer from a statistics generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryStats {
    Ready(Vec<ContributorActivity>),
    /// Someone else is computing the numbers; callers treat this as zero.
    Generating,
}

/// Produces raw per-contributor weekly commit counts for a repository's
/// default branch.
pub trait StatsGenerator: Send + Sync {
    fn weekly_stats(&self, repo: &Repo) -> Result<PrimaryStats>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSource {
    /// Served from the secondary tier.
    Cached,
    /// Computed and written to the secondary tier by this caller.
    Computed,
    /// Computed without touching the cache.
    Uncached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsLookup {
    pub stats: ContributorStats,
    pub source: StatsSource,
}

impl StatsLookup {
    fn uncached(stats: ContributorStats) -> Self {
        Self {
            stats,
            source: StatsSource::Uncached,
        }
    }
}

pub fn secondary_key(repo_id: i64, since: i64, window_days: u32) -> String {
    format!("contributor_stats:{repo_id}:{since}:{window_days}")
}

/// Filters raw activity down to contributor counts.
///
/// A week counts only if it starts at or after `cutoff`; a week straddling
/// the cutoff is attributed to the history before it. A counted contributor
/// is recent if one of those weeks overlaps the trailing `window_days`.
pub fn summarize(
    activity: &[ContributorActivity],
    cutoff: i64,
    window_days: u32,
    now: i64,
) -> ContributorStats {
    let window_start = now - i64::from(window_days) * SECONDS_PER_DAY;
    let mut stats = ContributorStats::default();

    for contributor in activity {
        let mut counted = false;
        let mut recent = false;
        for week in contributor.weeks.iter().filter(|w| w.commits > 0) {
            if week.week < cutoff {
                continue;
            }
            counted = true;
            if week.week + SECONDS_PER_WEEK > window_start {
                recent = true;
                break;
            }
        }
        if counted {
            stats.total_count += 1;
        }
        if recent {
            stats.recent_count += 1;
        }
    }

    stats
}

/// Secondary tier over a [`StatsGenerator`], with stampede prevention and
/// per-repository invalidation.
pub struct ContributorStatsCache {
    generator: Arc<dyn StatsGenerator>,
    cache: Option<Arc<dyn CacheStore>>,
    coordinator: Arc<CacheCoordinator>,
    ttl: Duration,
}

impl ContributorStatsCache {
    pub fn new(
        generator: Arc<dyn StatsGenerator>,
        cache: Option<Arc<dyn CacheStore>>,
        coordinator: Arc<CacheCoordinator>,
        ttl: Duration,
    ) -> Self {
        Self {
            generator,
            cache,
            coordinator,
            ttl,
        }
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    /// Contributor counts for `repo` since `since`, with a window trailing `now`.
    pub fn stats_at(
        &self,
        repo: &Repo,
        since: DateTime<Utc>,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> StatsLookup {
        if since > now {
            return StatsLookup::uncached(ContributorStats::default());
        }

        let since = since.timestamp();
        let now = now.timestamp();

        let Some(cache) = self.cache.as_deref() else {
            return StatsLookup::uncached(self.compute(repo, since, window_days, now).0);
        };

        let key = secondary_key(repo.id, since, window_days);
        if let Some(stats) = read(cache, &key) {
            return StatsLookup {
                stats,
                source: StatsSource::Cached,
            };
        }

        let Some(_guard) = self.coordinator.try_acquire(&key) else {
            debug!("Stats for {key} already being computed, skipping cache write");
            return StatsLookup::uncached(self.compute(repo, since, window_days, now).0);
        };

        // The previous holder may have filled the key between our miss and acquiring.
        if let Some(stats) = read(cache, &key) {
            return StatsLookup {
                stats,
                source: StatsSource::Cached,
            };
        }

        let (stats, complete) = self.compute(repo, since, window_days, now);
        if !complete {
            return StatsLookup::uncached(stats);
        }

        match put_json(cache, &key, &stats, self.ttl) {
            Ok(()) => self.coordinator.register(repo.id, &key, self.ttl),
            Err(e) => warn!("Failed to cache contributor stats {key}: {e}"),
        }

        StatsLookup {
            stats,
            source: StatsSource::Computed,
        }
    }

    /// Drops every secondary entry derived from `repo_id`. Failures are logged.
    pub fn invalidate(&self, repo_id: i64) {
        let Some(cache) = self.cache.as_deref() else {
            return;
        };

        let keys = self.coordinator.take_keys(repo_id);
        for key in &keys {
            if let Err(e) = cache.delete(key) {
                warn!("Failed to invalidate contributor stats {key}: {e}");
            }
        }
        debug!("Invalidated {} contributor stats entries for repo {repo_id}", keys.len());
    }

    /// Returns the stats and whether they reflect finished primary data.
    fn compute(
        &self,
        repo: &Repo,
        since: i64,
        window_days: u32,
        now: i64,
    ) -> (ContributorStats, bool) {
        match self.generator.weekly_stats(repo) {
            Ok(PrimaryStats::Ready(activity)) => {
                (summarize(&activity, since, window_days, now), true)
            }
            Ok(PrimaryStats::Generating) => (ContributorStats::default(), false),
            Err(e) => {
                warn!("Failed to generate contributor stats for repo {}: {e}", repo.id);
                (ContributorStats::default(), false)
            }
        }
    }
}

fn read(cache: &dyn CacheStore, key: &str) -> Option<ContributorStats> {
    match get_json(cache, key) {
        Ok(stats) => stats,
        Err(e) => {
            warn!("Failed to read contributor stats {key}: {e}");
            None
        }
    }
}
