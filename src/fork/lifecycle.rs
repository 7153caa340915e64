use serde::Serialize;
use tracing::{info, warn};

use super::root::{RootAssignment, assign_root, assign_root_in};
use super::ForkTreeLimiter;
use crate::error::{Error, Result};
use crate::store::{RepoLookup, Store, Tx, in_transaction};
use crate::subject::get_or_create_subject;
use crate::types::{Repo, User};

const MAX_REPO_NAME_LEN: usize = 100;

fn validate_repo_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::BadRequest("Repository name cannot be empty".to_string()));
    }
    if name.len() > MAX_REPO_NAME_LEN {
        return Err(Error::BadRequest(format!(
            "Repository name cannot exceed {MAX_REPO_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(Error::BadRequest(
            "Repository name can only contain alphanumeric characters, hyphens, underscores, and periods"
                .to_string(),
        ));
    }
    Ok(())
}

/// Rejects a second repository for the same subject under one owner.
fn ensure_no_subject_repo(tx: &Tx<'_>, owner_id: i64, subject_id: i64) -> Result<()> {
    if let Some(existing) = tx.get_repo_by_owner_and_subject(owner_id, subject_id)? {
        return Err(Error::UserOwnsSubjectRepo {
            user_id: owner_id,
            subject_id,
            existing_repo_id: existing.id,
        });
    }
    Ok(())
}

/// Creates an empty, non-fork repository, optionally attached to a subject.
pub fn create_repository(
    store: &dyn Store,
    owner: &User,
    name: &str,
    subject_name: Option<&str>,
) -> Result<Repo> {
    validate_repo_name(name)?;

    let subject_id = match subject_name {
        Some(subject_name) => get_or_create_subject(store, subject_name)?.id,
        None => 0,
    };

    in_transaction(store, |tx| {
        ensure_no_subject_repo(tx, owner.id, subject_id)?;
        tx.insert_repo(&Repo::new(owner.id, name, subject_id))
    })
}

/// Creates a fork of `base_id` owned by `actor`.
///
/// The ownership guards and the size limit are checked in the same
/// transaction that inserts the fork.
pub fn fork_repository(
    store: &dyn Store,
    limiter: &ForkTreeLimiter,
    actor: &User,
    base_id: i64,
    name: Option<&str>,
) -> Result<Repo> {
    let fork = in_transaction(store, |tx| {
        let base = tx.get_repo_by_id(base_id)?.ok_or(Error::NotFound)?;

        if base.owner_id == actor.id {
            return Err(Error::CannotForkOwnRepo);
        }
        if let Some(existing) = tx.get_fork_by_owner(actor.id, base.id)? {
            return Err(Error::ForkAlreadyExist {
                repo_id: base.id,
                fork_id: existing.id,
            });
        }
        ensure_no_subject_repo(tx, actor.id, base.subject_id)?;

        let name = name.unwrap_or(&base.name);
        validate_repo_name(name)?;
        limiter.check(tx, &base)?;

        let mut fork = Repo::new(actor.id, name, base.subject_id);
        fork.description = base.description.clone();
        fork.is_private = base.is_private;
        fork.is_empty = base.is_empty;
        fork.default_branch = base.default_branch.clone();
        fork.is_fork = true;
        fork.fork_id = base.id;

        let fork = tx.insert_repo(&fork)?;
        tx.adjust_num_forks(base.id, 1)?;
        Ok(fork)
    })?;

    info!("User {} forked repository {} as {}", actor.id, base_id, fork.id);
    Ok(fork)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PushOutcome {
    /// The push turned an empty repository into one with content.
    pub first_content: bool,
    pub assignment: Option<RootAssignment>,
}

/// Records a push. The first push with content runs the root-assignment
/// transition in the same transaction that clears `is_empty`.
pub fn record_push(
    store: &dyn Store,
    limiter: &ForkTreeLimiter,
    repo_id: i64,
) -> Result<PushOutcome> {
    in_transaction(store, |tx| {
        let repo = tx.get_repo_by_id(repo_id)?.ok_or(Error::NotFound)?;
        if !repo.is_empty {
            return Ok(PushOutcome {
                first_content: false,
                assignment: None,
            });
        }

        tx.set_repo_empty(repo.id, false)?;
        let assignment = assign_root_in(tx, limiter, repo.id)?;
        Ok(PushOutcome {
            first_content: true,
            assignment: Some(assignment),
        })
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Direct forks that lost their parent and became non-forks.
    pub detached: Vec<i64>,
    pub reassigned: Vec<(i64, RootAssignment)>,
}

/// Deletes a repository, keeping `num_forks` and subject roots consistent.
///
/// Direct forks are detached, then re-enter root assignment newest first, so
/// they settle under the oldest remaining root of their subject.
pub fn delete_repository(
    store: &dyn Store,
    limiter: &ForkTreeLimiter,
    repo_id: i64,
) -> Result<DeleteOutcome> {
    let mut children = in_transaction(store, |tx| {
        let repo = tx.get_repo_by_id(repo_id)?.ok_or(Error::NotFound)?;

        if repo.is_fork && repo.fork_id != repo.id {
            match tx.adjust_num_forks(repo.fork_id, -1) {
                Ok(()) => {}
                Err(Error::NotFound) => {
                    warn!("Repository {} points at missing parent {}", repo.id, repo.fork_id);
                }
                Err(e) => return Err(e),
            }
        }

        let mut children = Vec::new();
        for child_id in tx.list_fork_ids(repo.id)? {
            if let Some(child) = tx.get_repo_by_id(child_id)? {
                tx.clear_fork_parent(child.id)?;
                children.push(child);
            }
        }

        tx.delete_repo(repo.id)?;
        Ok(children)
    })?;

    children.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let mut outcome = DeleteOutcome {
        detached: children.iter().map(|c| c.id).collect(),
        reassigned: Vec::new(),
    };

    for child in children {
        match assign_root(store, limiter, child.id) {
            Ok(RootAssignment::NotApplicable) => {}
            Ok(assignment) => outcome.reassigned.push((child.id, assignment)),
            Err(e) => warn!("Failed to reassign root for detached repository {}: {e}", child.id),
        }
    }

    info!(
        "Deleted repository {repo_id}, detached {} forks",
        outcome.detached.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_validate_repo_name() {
        assert!(validate_repo_name("the-moon_2.0").is_ok());
        assert!(validate_repo_name("").is_err());
        assert!(validate_repo_name("the moon").is_err());
        assert!(validate_repo_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_concurrent_forks_by_one_actor() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        let alice = store.create_user("alice").unwrap();
        let bob = store.create_user("bob").unwrap();
        let base = store.create_repo(&Repo::new(alice.id, "notes", 0)).unwrap();

        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let bob = bob.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let name = format!("notes-{i}");
                    fork_repository(store.as_ref(), &ForkTreeLimiter::new(-1), &bob, base.id, Some(&name))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::ForkAlreadyExist { .. })));
        assert_eq!(store.get_repo_by_id(base.id).unwrap().unwrap().num_forks, 1);
    }
}
