use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::summary::attach_summaries;
use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::fork::{DEFAULT_ROOT_SEARCH_DEPTH, find_tree_root};
use crate::stats::{ContributorStatsCache, StatsSource};
use crate::store::{ForkListQuery, Store};
use crate::types::{
    CacheStatus, GraphMetadata, GraphNode, GraphParams, GraphResponse, GraphStatus, Pagination,
    Repo, User,
};

/// Builds the fork tree around a repository for display.
pub struct ForkGraphBuilder<'a> {
    store: &'a dyn Store,
    stats: Option<&'a ContributorStatsCache>,
    config: &'a GraphConfig,
}

/// Mutable bookkeeping for one build.
struct Walk<'a> {
    cancel: &'a CancellationToken,
    started: Instant,
    visited: HashSet<i64>,
    cycles: Vec<i64>,
    nodes: usize,
    max_depth: usize,
    max_depth_reached: bool,
    forks: ForkListQuery,
    root_page: u32,
    contributors: Option<u32>,
    now: DateTime<Utc>,
    cache_hits: usize,
    cache_misses: usize,
}

impl<'a> ForkGraphBuilder<'a> {
    pub fn new(
        store: &'a dyn Store,
        stats: Option<&'a ContributorStatsCache>,
        config: &'a GraphConfig,
    ) -> Self {
        Self {
            store,
            stats,
            config,
        }
    }

    /// Builds the graph for `repo` as seen by `actor`.
    ///
    /// Cycles in the stored fork pointers are skipped and reported in the
    /// metadata. Exceeding the node budget fails with `TooManyNodes`; running
    /// past the processing timeout, or `cancel` firing, fails with
    /// `ProcessingTimeout`.
    pub fn build(
        &self,
        repo: &Repo,
        params: &GraphParams,
        actor: Option<&User>,
        cancel: &CancellationToken,
    ) -> Result<GraphResponse> {
        let page = params.page.max(1);
        let limit = params
            .limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1));
        let window_days = params
            .contributor_window_days
            .min(self.config.max_contributor_window_days);

        let Some(root) = self.resolve_root(repo)? else {
            debug!("Subject {} of repo {} has no root yet", repo.subject_id, repo.id);
            return Ok(empty_response(page, limit, window_days));
        };

        let mut walk = Walk {
            cancel,
            started: Instant::now(),
            visited: HashSet::new(),
            cycles: Vec::new(),
            nodes: 0,
            max_depth: params
                .max_depth
                .unwrap_or(self.config.max_depth)
                .min(self.config.max_depth),
            max_depth_reached: false,
            forks: ForkListQuery {
                page,
                limit,
                include_private: params.include_private,
                viewer_id: actor.map(|a| a.id),
                sort: params.sort,
            },
            root_page: page,
            contributors: (params.include_contributors && self.stats.is_some())
                .then_some(window_days),
            now: Utc::now(),
            cache_hits: 0,
            cache_misses: 0,
        };

        let total = root.num_forks;
        let Some(mut tree) = self.visit(&mut walk, root, 0)? else {
            return Err(Error::Internal("fork graph root was skipped".to_string()));
        };

        attach_summaries(self.store, &mut tree)?;

        let visible_forks = tree.count() - 1;
        if !walk.cycles.is_empty() {
            warn!(
                "Fork graph for repo {} skipped cycles at {:?}",
                repo.id, walk.cycles
            );
        }

        Ok(GraphResponse {
            status: GraphStatus::Ready,
            root: Some(tree),
            metadata: GraphMetadata {
                total_forks: total,
                visible_forks,
                max_depth_reached: walk.max_depth_reached,
                cache_status: walk.cache_status(),
                cycles_detected: walk.cycles,
                generated_at: walk.now,
                contributor_window_days: window_days,
            },
            pagination: Pagination {
                page,
                limit,
                total,
                has_more: i64::from(page) * i64::from(limit) < total,
            },
        })
    }

    /// The subject's canonical root, or the top of the repository's own fork
    /// chain when it has no subject. `None` means the subject has no root yet.
    fn resolve_root(&self, repo: &Repo) -> Result<Option<Repo>> {
        if repo.has_subject() {
            return self.store.find_subject_root(repo.subject_id, 0);
        }

        match find_tree_root(self.store, repo, DEFAULT_ROOT_SEARCH_DEPTH) {
            Ok(root) => Ok(Some(root)),
            Err(Error::CycleDetected { repo_id }) => {
                warn!("Fork chain of repo {} loops at {repo_id}, rooting graph at it", repo.id);
                Ok(Some(repo.clone()))
            }
            Err(e) => Err(e),
        }
    }

    fn visit(&self, walk: &mut Walk<'_>, repo: Repo, level: usize) -> Result<Option<GraphNode>> {
        if walk.cancel.is_cancelled() || walk.started.elapsed() > self.config.processing_timeout() {
            return Err(Error::ProcessingTimeout {
                timeout: self.config.processing_timeout(),
            });
        }

        if !walk.visited.insert(repo.id) {
            warn!("Fork cycle at repo {}, skipping subtree", repo.id);
            walk.cycles.push(repo.id);
            return Ok(None);
        }

        walk.nodes += 1;
        if walk.nodes > self.config.max_nodes {
            return Err(Error::TooManyNodes {
                limit: self.config.max_nodes,
            });
        }

        let mut node = GraphNode::new(repo, level);
        self.attach_contributors(walk, &mut node);

        let Some(repo) = node.repo.as_ref() else {
            return Ok(Some(node));
        };
        if level >= walk.max_depth {
            if repo.num_forks > 0 {
                walk.max_depth_reached = true;
            }
            return Ok(Some(node));
        }

        let query = ForkListQuery {
            page: if level == 0 { walk.root_page } else { 1 },
            ..walk.forks.clone()
        };
        let forks = self.store.list_forks(repo.id, &query)?;

        for fork in forks {
            if let Some(child) = self.visit(walk, fork, level + 1)? {
                node.children.push(child);
            }
        }
        Ok(Some(node))
    }

    fn attach_contributors(&self, walk: &mut Walk<'_>, node: &mut GraphNode) {
        let (Some(stats), Some(window_days)) = (self.stats, walk.contributors) else {
            return;
        };
        let Some(repo) = node.repo.as_ref() else {
            return;
        };

        // Forks only count history made after they split off.
        let since = if node.level == 0 {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            repo.created_at
        };

        let lookup = stats.stats_at(repo, since, window_days, walk.now);
        match lookup.source {
            StatsSource::Cached => walk.cache_hits += 1,
            StatsSource::Computed | StatsSource::Uncached => walk.cache_misses += 1,
        }
        node.contributors = Some(lookup.stats);
    }
}

impl Walk<'_> {
    fn cache_status(&self) -> CacheStatus {
        match (self.contributors, self.cache_hits, self.cache_misses) {
            (None, _, _) => CacheStatus::Disabled,
            (Some(_), _, 0) => CacheStatus::Hit,
            (Some(_), 0, _) => CacheStatus::Miss,
            _ => CacheStatus::Partial,
        }
    }
}

fn empty_response(page: u32, limit: u32, window_days: u32) -> GraphResponse {
    GraphResponse {
        status: GraphStatus::NoRoot,
        root: None,
        metadata: GraphMetadata {
            total_forks: 0,
            visible_forks: 0,
            max_depth_reached: false,
            cycles_detected: Vec::new(),
            cache_status: CacheStatus::Disabled,
            generated_at: Utc::now(),
            contributor_window_days: window_days,
        },
        pagination: Pagination {
            page,
            limit,
            total: 0,
            has_more: false,
        },
    }
}
