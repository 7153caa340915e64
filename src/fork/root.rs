use serde::Serialize;
use tracing::{info, warn};

use super::ForkTreeLimiter;
use crate::error::{Error, Result};
use crate::store::{RepoLookup, Store, Tx, in_transaction};

/// Result of running the root-assignment transition for one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RootAssignment {
    /// No subject, or still empty: the repository takes no part in root selection.
    NotApplicable,
    /// Already a fork; the transition is a no-op.
    AlreadyFork { parent_id: i64 },
    /// No other root exists for the subject, so this repository is the root.
    Root,
    /// Another root existed; the repository now forks from it.
    Forked { root_id: i64 },
    /// The root's tree is full. The repository stays a second root for now.
    LimitExceeded { root_id: i64 },
}

/// Decides, in its own transaction, whether `repo_id` is its subject's root or
/// must become a fork of the existing root.
pub fn assign_root(
    store: &dyn Store,
    limiter: &ForkTreeLimiter,
    repo_id: i64,
) -> Result<RootAssignment> {
    in_transaction(store, |tx| assign_root_in(tx, limiter, repo_id))
}

/// The transition itself, for callers that already hold a transaction.
///
/// The candidate is re-read through `tx` so a stale in-memory copy cannot
/// decide the outcome.
pub fn assign_root_in(
    tx: &Tx<'_>,
    limiter: &ForkTreeLimiter,
    repo_id: i64,
) -> Result<RootAssignment> {
    let candidate = tx.get_repo_by_id(repo_id)?.ok_or(Error::NotFound)?;

    if candidate.is_fork {
        return Ok(RootAssignment::AlreadyFork {
            parent_id: candidate.fork_id,
        });
    }
    if !candidate.has_subject() || candidate.is_empty {
        return Ok(RootAssignment::NotApplicable);
    }

    let Some(root) = tx.find_subject_root(candidate.subject_id, candidate.id)? else {
        return Ok(RootAssignment::Root);
    };
    if root.id == candidate.id {
        return Ok(RootAssignment::Root);
    }

    match limiter.check(tx, &root) {
        Ok(()) => {}
        Err(e @ Error::ForkTreeTooLarge { .. }) => {
            // The commit stands; the repository stays a second root.
            warn!(
                "Repository {} left as a second root of subject {}: {e}",
                candidate.id, candidate.subject_id
            );
            return Ok(RootAssignment::LimitExceeded { root_id: root.id });
        }
        Err(e) => return Err(e),
    }

    tx.set_fork_parent(candidate.id, root.id)?;
    tx.adjust_num_forks(root.id, 1)?;

    info!(
        "Repository {} became a fork of subject {} root {}",
        candidate.id, candidate.subject_id, root.id
    );
    Ok(RootAssignment::Forked { root_id: root.id })
}
