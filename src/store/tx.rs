use chrono::Utc;
use rusqlite::{Connection, params};

use super::RepoLookup;
use super::sqlite::{
    format_datetime, insert_repo, query_fork_by_owner, query_fork_ids, query_repo_by_id,
    query_repo_by_owner_and_subject, query_subject_root,
};
use crate::error::{Error, Result};
use crate::types::Repo;

/// Handle to an open write transaction.
///
/// Only exposes the reads and the narrow writes the fork protocols need, so
/// every `fork_id` change sits next to its paired `num_forks` adjustment.
pub struct Tx<'a> {
    conn: &'a Connection,
}

impl<'a> Tx<'a> {
    pub(super) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_subject_root(&self, subject_id: i64, exclude_id: i64) -> Result<Option<Repo>> {
        query_subject_root(self.conn, subject_id, exclude_id)
    }

    pub fn get_repo_by_owner_and_subject(
        &self,
        owner_id: i64,
        subject_id: i64,
    ) -> Result<Option<Repo>> {
        query_repo_by_owner_and_subject(self.conn, owner_id, subject_id)
    }

    pub fn get_fork_by_owner(&self, owner_id: i64, fork_of: i64) -> Result<Option<Repo>> {
        query_fork_by_owner(self.conn, owner_id, fork_of)
    }

    pub fn insert_repo(&self, repo: &Repo) -> Result<Repo> {
        insert_repo(self.conn, repo)
    }

    pub fn set_fork_parent(&self, repo_id: i64, parent_id: i64) -> Result<()> {
        self.update_one(
            "UPDATE repos SET is_fork = 1, fork_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![parent_id, format_datetime(&Utc::now()), repo_id],
        )
    }

    pub fn clear_fork_parent(&self, repo_id: i64) -> Result<()> {
        self.update_one(
            "UPDATE repos SET is_fork = 0, fork_id = 0, updated_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), repo_id],
        )
    }

    /// Never drops the counter below zero.
    pub fn adjust_num_forks(&self, repo_id: i64, delta: i64) -> Result<()> {
        self.update_one(
            "UPDATE repos SET num_forks = MAX(0, num_forks + ?1) WHERE id = ?2",
            params![delta, repo_id],
        )
    }

    pub fn set_repo_empty(&self, repo_id: i64, is_empty: bool) -> Result<()> {
        self.update_one(
            "UPDATE repos SET is_empty = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_empty, format_datetime(&Utc::now()), repo_id],
        )
    }

    pub fn delete_repo(&self, repo_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM repos WHERE id = ?1", params![repo_id])?;
        Ok(rows > 0)
    }

    fn update_one(&self, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let rows = self.conn.execute(sql, params)?;
        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

impl RepoLookup for Tx<'_> {
    fn get_repo_by_id(&self, id: i64) -> Result<Option<Repo>> {
        query_repo_by_id(self.conn, id)
    }

    fn list_fork_ids(&self, id: i64) -> Result<Vec<i64>> {
        query_fork_ids(self.conn, id)
    }
}
