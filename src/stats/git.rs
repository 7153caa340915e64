use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use git2::{ErrorCode, Oid, Repository, Sort};
use tracing::{debug, warn};

use super::cache::{CacheStore, get_json, put_json};
use super::contributors::{PrimaryStats, SECONDS_PER_DAY, StatsGenerator};
use super::coordinator::CacheCoordinator;
use crate::error::Result;
use crate::types::{ContributorActivity, Repo, WeeklyCommits};

/// Start of the week containing `secs`, Sunday 00:00 UTC.
pub fn week_start(secs: i64) -> i64 {
    let days = secs.div_euclid(SECONDS_PER_DAY);
    // 1970-01-01 was a Thursday.
    (days - (days + 4).rem_euclid(7)) * SECONDS_PER_DAY
}

pub fn repo_path(repos_dir: &Path, repo: &Repo) -> PathBuf {
    repos_dir
        .join(repo.owner_id.to_string())
        .join(format!("{}.git", repo.id))
}

/// Weekly commit counts read from bare repositories on disk.
///
/// Results are cached per head commit, so a push naturally produces a new key.
pub struct GitStatsGenerator {
    repos_dir: PathBuf,
    cache: Option<Arc<dyn CacheStore>>,
    coordinator: Arc<CacheCoordinator>,
    ttl: Duration,
}

impl GitStatsGenerator {
    pub fn new(
        repos_dir: impl Into<PathBuf>,
        cache: Option<Arc<dyn CacheStore>>,
        coordinator: Arc<CacheCoordinator>,
        ttl: Duration,
    ) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            cache,
            coordinator,
            ttl,
        }
    }

    fn head(&self, git: &Repository, branch: &str) -> Result<Option<Oid>> {
        match git.find_reference(&format!("refs/heads/{branch}")) {
            Ok(reference) => Ok(reference.peel_to_commit().ok().map(|c| c.id())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl StatsGenerator for GitStatsGenerator {
    fn weekly_stats(&self, repo: &Repo) -> Result<PrimaryStats> {
        let path = repo_path(&self.repos_dir, repo);
        if !path.exists() {
            debug!("No git directory for repo {} at {}", repo.id, path.display());
            return Ok(PrimaryStats::Ready(Vec::new()));
        }

        let git = Repository::open_bare(&path)?;
        let Some(head) = self.head(&git, &repo.default_branch)? else {
            return Ok(PrimaryStats::Ready(Vec::new()));
        };

        let key = format!("contributor_weekly:{}:{head}", repo.id);
        if let Some(cache) = self.cache.as_deref() {
            match get_json::<Vec<ContributorActivity>>(cache, &key) {
                Ok(Some(activity)) => return Ok(PrimaryStats::Ready(activity)),
                Ok(None) => {}
                Err(e) => warn!("Failed to read weekly stats {key}: {e}"),
            }
        }

        let Some(_guard) = self.coordinator.try_acquire(&key) else {
            return Ok(PrimaryStats::Generating);
        };

        let activity = collect_activity(&git, head)?;
        if let Some(cache) = self.cache.as_deref() {
            if let Err(e) = put_json(cache, &key, &activity, self.ttl) {
                warn!("Failed to cache weekly stats {key}: {e}");
            }
        }
        Ok(PrimaryStats::Ready(activity))
    }
}

fn collect_activity(git: &Repository, head: Oid) -> Result<Vec<ContributorActivity>> {
    let mut revwalk = git.revwalk()?;
    revwalk.set_sorting(Sort::TIME)?;
    revwalk.push(head)?;

    // email -> (display name, week -> commits)
    let mut by_author: BTreeMap<String, (String, BTreeMap<i64, u32>)> = BTreeMap::new();

    for oid in revwalk {
        let commit = git.find_commit(oid?)?;
        let author = commit.author();
        let email = author.email().unwrap_or_default().to_lowercase();
        let name = author.name().unwrap_or_default().to_string();

        let (_, weeks) = by_author.entry(email).or_insert_with(|| (name, BTreeMap::new()));
        *weeks.entry(week_start(author.when().seconds())).or_default() += 1;
    }

    Ok(by_author
        .into_iter()
        .map(|(email, (name, weeks))| ContributorActivity {
            name,
            email,
            total_commits: weeks.values().sum(),
            weeks: weeks
                .into_iter()
                .map(|(week, commits)| WeeklyCommits { week, commits })
                .collect(),
        })
        .collect())
}
