//! Edit permissions: whether an actor edits a repository directly, must fork
//! it first, or is blocked because they already own an article on its subject.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{EditPermissions, Repo, User};

/// Runs a store call on the blocking pool.
async fn blocking<T, F>(store: Arc<dyn Store>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Store) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {e}")))?
}

/// Resolves what `actor` may do with `repo`.
///
/// For non-owners the subject-ownership and existing-fork lookups run
/// concurrently; the first failure is returned.
pub async fn resolve_permissions(
    store: Arc<dyn Store>,
    actor: Option<&User>,
    repo: &Repo,
) -> Result<EditPermissions> {
    let Some(actor) = actor else {
        return Ok(EditPermissions::anonymous());
    };
    if actor.id == repo.owner_id {
        return Ok(EditPermissions::owner());
    }

    let (actor_id, repo_id, subject_id) = (actor.id, repo.id, repo.subject_id);

    let subject_repo = blocking(Arc::clone(&store), move |store| {
        if subject_id == 0 {
            return Ok(None);
        }
        store.get_repo_by_owner_and_subject(actor_id, subject_id)
    });
    let existing_fork = blocking(store, move |store| {
        store.get_fork_by_owner(actor_id, repo_id)
    });

    let (subject_repo, existing_fork) = tokio::try_join!(subject_repo, existing_fork)?;

    let mut permissions = EditPermissions::default();
    match (subject_repo, existing_fork) {
        (Some(own), _) if own.id != repo_id => {
            debug!(
                "User {actor_id} blocked from forking repo {repo_id}: owns repo {} for subject {subject_id}",
                own.id
            );
            permissions.blocked_by_subject = true;
            permissions.own_repo_for_subject = Some(own);
            return Ok(permissions);
        }
        (_, Some(fork)) => {
            permissions.has_existing_fork = true;
            permissions.existing_fork = Some(fork);
        }
        (_, None) => permissions.needs_fork = true,
    }

    permissions.can_submit_change_request = true;
    Ok(permissions)
}
