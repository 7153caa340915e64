#![allow(dead_code)]

use std::sync::Arc;

use forkwiki::fork::{ForkTreeLimiter, create_repository, record_push};
use forkwiki::store::{RepoLookup, SqliteStore, Store};
use forkwiki::types::{Repo, User};

pub fn store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().expect("open in-memory store");
    store.initialize().expect("initialize schema");
    Arc::new(store)
}

pub fn user(store: &dyn Store, name: &str) -> User {
    store.create_user(name).expect("create user")
}

pub fn unlimited() -> ForkTreeLimiter {
    ForkTreeLimiter::new(-1)
}

/// Creates a repository for `subject` and pushes content to it.
pub fn article(store: &dyn Store, owner: &User, name: &str, subject: Option<&str>) -> Repo {
    let repo = create_repository(store, owner, name, subject).expect("create repository");
    record_push(store, &unlimited(), repo.id).expect("record push");
    reload(store, repo.id)
}

pub fn reload(store: &dyn Store, id: i64) -> Repo {
    store
        .get_repo_by_id(id)
        .expect("load repository")
        .expect("repository exists")
}

/// Rewrites a fork pointer directly, bypassing the lifecycle operations.
pub fn point_fork(store: &SqliteStore, repo_id: i64, parent_id: i64) {
    store
        .connection()
        .execute(
            "UPDATE repos SET is_fork = 1, fork_id = ?1 WHERE id = ?2",
            [parent_id, repo_id],
        )
        .expect("update fork pointer");
}
