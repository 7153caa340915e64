mod schema;
mod sqlite;
mod tx;

use std::collections::HashMap;

pub use sqlite::SqliteStore;
pub use tx::Tx;

use crate::error::{Error, Result};
use crate::types::*;

/// Read access to the fork pointers, shared by the store and an open transaction.
pub trait RepoLookup {
    fn get_repo_by_id(&self, id: i64) -> Result<Option<Repo>>;

    /// Ids of the repositories whose `fork_id` points at `id`, self-loops excluded.
    fn list_fork_ids(&self, id: i64) -> Result<Vec<i64>>;
}

/// Filter and order for listing the direct forks of a repository.
#[derive(Debug, Clone)]
pub struct ForkListQuery {
    pub page: u32,
    pub limit: u32,
    pub include_private: bool,
    /// Private forks owned by this user stay visible.
    pub viewer_id: Option<i64>,
    pub sort: SortKey,
}

impl Default for ForkListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            include_private: false,
            viewer_id: None,
            sort: SortKey::Updated,
        }
    }
}

/// Store defines the database interface.
pub trait Store: RepoLookup + Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, name: &str) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;
    fn get_users_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, User>>;

    // Subject operations
    fn insert_subject(&self, name: &str, slug: &str) -> Result<Subject>;
    /// Inserts unless the slug is taken; returns whether a row was written.
    fn insert_subject_if_absent(&self, name: &str, slug: &str) -> Result<bool>;
    fn get_subject(&self, id: i64) -> Result<Option<Subject>>;
    fn get_subject_by_slug(&self, slug: &str) -> Result<Option<Subject>>;
    fn get_subjects_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Subject>>;
    fn update_subject(&self, id: i64, name: &str, slug: &str) -> Result<()>;
    fn delete_subject(&self, id: i64) -> Result<bool>;
    fn count_subject_repos(&self, id: i64) -> Result<i64>;
    /// Subjects whose name or slug contains the term, at most `limit` rows,
    /// prefix matches first, then word-boundary prefixes, then the rest,
    /// most recently updated first within each tier.
    fn search_subjects(&self, name_term: &str, slug_term: &str, limit: u32)
    -> Result<Vec<Subject>>;

    // Repo operations
    fn create_repo(&self, repo: &Repo) -> Result<Repo>;
    fn get_repo_by_owner_and_subject(&self, owner_id: i64, subject_id: i64)
    -> Result<Option<Repo>>;
    fn get_fork_by_owner(&self, owner_id: i64, fork_of: i64) -> Result<Option<Repo>>;
    /// The subject's root, ignoring `exclude_id`. When several compete, the oldest wins.
    fn find_subject_root(&self, subject_id: i64, exclude_id: i64) -> Result<Option<Repo>>;
    fn list_forks(&self, repo_id: i64, query: &ForkListQuery) -> Result<Vec<Repo>>;
    fn set_repo_units(&self, repo_id: i64, units: &[UnitType]) -> Result<()>;
    fn set_repo_licenses(&self, repo_id: i64, licenses: &[String]) -> Result<()>;
    fn list_units_for_repos(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<UnitType>>>;
    fn list_licenses_for_repos(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>>;

    /// Runs `f` inside one write transaction; commits on `Ok`, rolls back on `Err`.
    fn transaction(&self, f: &mut dyn FnMut(&Tx<'_>) -> Result<()>) -> Result<()>;
}

/// Runs `f` in a transaction and hands back its value.
pub fn in_transaction<S, T, F>(store: &S, mut f: F) -> Result<T>
where
    S: Store + ?Sized,
    F: FnMut(&Tx<'_>) -> Result<T>,
{
    let mut out = None;
    store.transaction(&mut |tx| {
        out = Some(f(tx)?);
        Ok(())
    })?;
    out.ok_or_else(|| Error::Internal("transaction finished without a result".to_string()))
}
