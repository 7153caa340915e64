use std::collections::HashSet;

use tracing::warn;

use crate::error::{Error, Result};
use crate::store::RepoLookup;
use crate::types::Repo;

/// How far `find_tree_root` walks up `fork_id` pointers before giving up.
pub const DEFAULT_ROOT_SEARCH_DEPTH: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeLimit {
    Disabled,
    Forbidden,
    Max(u64),
}

impl From<i64> for TreeLimit {
    fn from(max_nodes: i64) -> Self {
        match max_nodes {
            n if n < 0 => TreeLimit::Disabled,
            0 => TreeLimit::Forbidden,
            n => TreeLimit::Max(n as u64),
        }
    }
}

/// Walks up from `repo` to the first non-fork repository.
///
/// A dangling or self-referencing pointer ends the walk at the current
/// repository. Revisiting a repository, or exceeding `max_depth` steps,
/// reports `CycleDetected`.
pub fn find_tree_root<L>(lookup: &L, repo: &Repo, max_depth: usize) -> Result<Repo>
where
    L: RepoLookup + ?Sized,
{
    let mut current = repo.clone();
    let mut seen = HashSet::from([current.id]);
    let mut steps = 0;

    loop {
        if !current.is_fork || current.fork_id == 0 || current.fork_id == current.id {
            return Ok(current);
        }
        if steps == max_depth {
            return Err(Error::CycleDetected { repo_id: current.id });
        }
        steps += 1;

        let Some(parent) = lookup.get_repo_by_id(current.fork_id)? else {
            warn!(
                "Repository {} points at missing parent {}",
                current.id, current.fork_id
            );
            return Ok(current);
        };

        if !seen.insert(parent.id) {
            return Err(Error::CycleDetected { repo_id: parent.id });
        }
        current = parent;
    }
}

/// Counts every repository reachable from `root_id` over fork edges, `root_id` included.
pub fn count_tree_nodes<L>(lookup: &L, root_id: i64) -> Result<u64>
where
    L: RepoLookup + ?Sized,
{
    let mut visited = HashSet::from([root_id]);
    let mut stack = vec![root_id];

    while let Some(id) = stack.pop() {
        for child in lookup.list_fork_ids(id)? {
            if visited.insert(child) {
                stack.push(child);
            }
        }
    }

    Ok(visited.len() as u64)
}

/// Bounds the number of repositories in one fork tree.
#[derive(Debug, Clone, Copy)]
pub struct ForkTreeLimiter {
    limit: TreeLimit,
}

impl ForkTreeLimiter {
    #[must_use]
    pub fn new(max_nodes: i64) -> Self {
        Self {
            limit: TreeLimit::from(max_nodes),
        }
    }

    /// Fails with `ForkTreeTooLarge` if adding one more repository to the tree
    /// containing `repo` would exceed the limit.
    ///
    /// Counting failures are logged and let the fork through.
    pub fn check<L>(&self, lookup: &L, repo: &Repo) -> Result<()>
    where
        L: RepoLookup + ?Sized,
    {
        let max = match self.limit {
            TreeLimit::Disabled => return Ok(()),
            TreeLimit::Forbidden => return Err(Error::ForkTreeTooLarge { limit: 0 }),
            TreeLimit::Max(max) => max,
        };

        let root = match find_tree_root(lookup, repo, DEFAULT_ROOT_SEARCH_DEPTH) {
            Ok(root) => root,
            Err(e) => {
                warn!("Failed to find fork tree root of repo {}: {e}", repo.id);
                return Ok(());
            }
        };

        let count = match count_tree_nodes(lookup, root.id) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to count fork tree of repo {}: {e}", root.id);
                return Ok(());
            }
        };

        if count >= max {
            return Err(Error::ForkTreeTooLarge { limit: max as i64 });
        }
        Ok(())
    }
}
