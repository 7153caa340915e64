use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};

use super::schema::SCHEMA;
use super::{ForkListQuery, RepoLookup, Store, Tx};
use crate::error::{Error, Result};
use crate::types::*;

/// SQLite caps bound variables per statement; batch lookups are chunked below it.
const ID_BATCH: usize = 500;

pub(super) const REPO_COLUMNS: &str = "id, owner_id, name, description, is_private, is_fork, fork_id, \
     subject_id, is_empty, num_forks, num_stars, default_branch, created_at, updated_at";

const SUBJECT_COLUMNS: &str = "id, name, slug, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A private in-memory database, mostly useful in tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

pub(super) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed width, so text order in SQL matches time order.
pub(super) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub(super) fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_private: row.get(4)?,
        is_fork: row.get(5)?,
        fork_id: row.get(6)?,
        subject_id: row.get(7)?,
        is_empty: row.get(8)?,
        num_forks: row.get(9)?,
        num_stars: row.get(10)?,
        default_branch: row.get(11)?,
        created_at: parse_datetime(&row.get::<_, String>(12)?),
        updated_at: parse_datetime(&row.get::<_, String>(13)?),
    })
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// Queries shared by the store and `Tx`.

pub(super) fn query_repo_by_id(conn: &Connection, id: i64) -> Result<Option<Repo>> {
    conn.query_row(
        &format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = ?1"),
        params![id],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub(super) fn query_fork_ids(conn: &Connection, id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM repos WHERE fork_id = ?1 AND is_fork = 1 AND id != ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub(super) fn query_subject_root(
    conn: &Connection,
    subject_id: i64,
    exclude_id: i64,
) -> Result<Option<Repo>> {
    conn.query_row(
        &format!(
            "SELECT {REPO_COLUMNS} FROM repos
             WHERE subject_id = ?1 AND is_fork = 0 AND is_empty = 0 AND id != ?2
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ),
        params![subject_id, exclude_id],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub(super) fn query_repo_by_owner_and_subject(
    conn: &Connection,
    owner_id: i64,
    subject_id: i64,
) -> Result<Option<Repo>> {
    if subject_id == 0 {
        return Ok(None);
    }
    conn.query_row(
        &format!(
            "SELECT {REPO_COLUMNS} FROM repos WHERE owner_id = ?1 AND subject_id = ?2
             ORDER BY id LIMIT 1"
        ),
        params![owner_id, subject_id],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub(super) fn query_fork_by_owner(
    conn: &Connection,
    owner_id: i64,
    fork_of: i64,
) -> Result<Option<Repo>> {
    conn.query_row(
        &format!(
            "SELECT {REPO_COLUMNS} FROM repos
             WHERE owner_id = ?1 AND is_fork = 1 AND fork_id = ?2
             ORDER BY id LIMIT 1"
        ),
        params![owner_id, fork_of],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub(super) fn insert_repo(conn: &Connection, repo: &Repo) -> Result<Repo> {
    let result = conn.execute(
        "INSERT INTO repos (owner_id, name, description, is_private, is_fork, fork_id, subject_id,
                            is_empty, num_forks, num_stars, default_branch, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            repo.owner_id,
            repo.name,
            repo.description,
            repo.is_private,
            repo.is_fork,
            repo.fork_id,
            repo.subject_id,
            repo.is_empty,
            repo.num_forks,
            repo.num_stars,
            repo.default_branch,
            format_datetime(&repo.created_at),
            format_datetime(&repo.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(Repo {
            id: conn.last_insert_rowid(),
            ..repo.clone()
        }),
        Err(e) if is_unique_violation(&e) => Err(Error::RepoAlreadyExists {
            name: repo.name.clone(),
        }),
        Err(e) => Err(Error::from(e)),
    }
}

impl RepoLookup for SqliteStore {
    fn get_repo_by_id(&self, id: i64) -> Result<Option<Repo>> {
        query_repo_by_id(&self.conn(), id)
    }

    fn list_fork_ids(&self, id: i64) -> Result<Vec<i64>> {
        query_fork_ids(&self.conn(), id)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, name: &str) -> Result<User> {
        let conn = self.conn();
        let now = Utc::now();
        let result = conn.execute(
            "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
            params![name, format_datetime(&now)],
        );

        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                created_at: now,
            }),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::BadRequest(format!("user already exists: {name}")))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn()
            .query_row(
                "SELECT id, name, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                "SELECT id, name, created_at FROM users WHERE name = ?1",
                params![name],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_users_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, User>> {
        let conn = self.conn();
        let mut users = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(ID_BATCH) {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name, created_at FROM users WHERE id IN ({})",
                placeholders(chunk.len())
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), user_from_row)?;
            for user in rows {
                let user = user?;
                users.insert(user.id, user);
            }
        }

        Ok(users)
    }

    // Subject operations

    fn insert_subject(&self, name: &str, slug: &str) -> Result<Subject> {
        let conn = self.conn();
        let now = Utc::now();
        let result = conn.execute(
            "INSERT INTO subjects (name, slug, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, slug, format_datetime(&now)],
        );

        match result {
            Ok(_) => Ok(Subject {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                slug: slug.to_string(),
                created_at: now,
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::SlugAlreadyExists {
                slug: slug.to_string(),
            }),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn insert_subject_if_absent(&self, name: &str, slug: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT INTO subjects (name, slug, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(slug) DO NOTHING",
            params![name, slug, format_datetime(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        self.conn()
            .query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
                params![id],
                subject_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_subject_by_slug(&self, slug: &str) -> Result<Option<Subject>> {
        self.conn()
            .query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE slug = ?1"),
                params![slug],
                subject_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_subjects_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Subject>> {
        let conn = self.conn();
        let mut subjects = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(ID_BATCH) {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id IN ({})",
                placeholders(chunk.len())
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), subject_from_row)?;
            for subject in rows {
                let subject = subject?;
                subjects.insert(subject.id, subject);
            }
        }

        Ok(subjects)
    }

    fn update_subject(&self, id: i64, name: &str, slug: &str) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE subjects SET name = ?1, slug = ?2, updated_at = ?3 WHERE id = ?4",
            params![name, slug, format_datetime(&Utc::now()), id],
        );

        match result {
            Ok(0) => Err(Error::SubjectNotExist { id }),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::SlugAlreadyExists {
                slug: slug.to_string(),
            }),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_subject(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM subjects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_subject_repos(&self, id: i64) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM repos WHERE subject_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn search_subjects(
        &self,
        name_term: &str,
        slug_term: &str,
        limit: u32,
    ) -> Result<Vec<Subject>> {
        let conn = self.conn();
        // Tier 0: prefix, tier 1: word-boundary prefix, tier 2: substring.
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects
             WHERE lower(name) LIKE ?1 ESCAPE '\\' OR (?2 != '' AND slug LIKE ?3 ESCAPE '\\')
             ORDER BY CASE
                 WHEN lower(name) LIKE ?4 ESCAPE '\\' OR (?2 != '' AND slug LIKE ?5 ESCAPE '\\') THEN 0
                 WHEN lower(name) LIKE ?6 ESCAPE '\\' OR (?2 != '' AND slug LIKE ?7 ESCAPE '\\') THEN 1
                 ELSE 2
             END, updated_at DESC, id DESC
             LIMIT ?8"
        ))?;

        let name = escape_like(&name_term.to_lowercase());
        let slug = escape_like(slug_term);
        let rows = stmt.query_map(
            params![
                format!("%{name}%"),
                slug_term,
                format!("%{slug}%"),
                format!("{name}%"),
                format!("{slug}%"),
                format!("% {name}%"),
                format!("%-{slug}%"),
                limit
            ],
            subject_from_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Repo operations

    fn create_repo(&self, repo: &Repo) -> Result<Repo> {
        insert_repo(&self.conn(), repo)
    }

    fn get_repo_by_owner_and_subject(
        &self,
        owner_id: i64,
        subject_id: i64,
    ) -> Result<Option<Repo>> {
        query_repo_by_owner_and_subject(&self.conn(), owner_id, subject_id)
    }

    fn get_fork_by_owner(&self, owner_id: i64, fork_of: i64) -> Result<Option<Repo>> {
        query_fork_by_owner(&self.conn(), owner_id, fork_of)
    }

    fn find_subject_root(&self, subject_id: i64, exclude_id: i64) -> Result<Option<Repo>> {
        query_subject_root(&self.conn(), subject_id, exclude_id)
    }

    fn list_forks(&self, repo_id: i64, query: &ForkListQuery) -> Result<Vec<Repo>> {
        let order = match query.sort {
            SortKey::Updated => "updated_at DESC, id DESC",
            SortKey::Created => "created_at DESC, id DESC",
            SortKey::Stars => "num_stars DESC, updated_at DESC, id DESC",
            SortKey::Forks => "num_forks DESC, updated_at DESC, id DESC",
        };
        let limit = query.limit.max(1);
        let offset = i64::from(query.page.max(1) - 1) * i64::from(limit);

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPO_COLUMNS} FROM repos
             WHERE fork_id = ?1 AND is_fork = 1 AND id != ?1
               AND (is_private = 0 OR ?2 OR owner_id = ?3)
             ORDER BY {order} LIMIT ?4 OFFSET ?5"
        ))?;

        let rows = stmt.query_map(
            params![
                repo_id,
                query.include_private,
                query.viewer_id.unwrap_or(0),
                limit,
                offset
            ],
            repo_from_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn set_repo_units(&self, repo_id: i64, units: &[UnitType]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM repo_units WHERE repo_id = ?1", params![repo_id])?;
        for unit in units {
            tx.execute(
                "INSERT OR IGNORE INTO repo_units (repo_id, unit_type) VALUES (?1, ?2)",
                params![repo_id, unit.as_str()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn set_repo_licenses(&self, repo_id: i64, licenses: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM repo_licenses WHERE repo_id = ?1",
            params![repo_id],
        )?;
        for license in licenses {
            tx.execute(
                "INSERT OR IGNORE INTO repo_licenses (repo_id, license) VALUES (?1, ?2)",
                params![repo_id, license],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_units_for_repos(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<UnitType>>> {
        let conn = self.conn();
        let mut units: HashMap<i64, Vec<UnitType>> = HashMap::new();

        for chunk in ids.chunks(ID_BATCH) {
            let mut stmt = conn.prepare(&format!(
                "SELECT repo_id, unit_type FROM repo_units WHERE repo_id IN ({})
                 ORDER BY repo_id, unit_type",
                placeholders(chunk.len())
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (repo_id, unit) = row?;
                match UnitType::parse(&unit) {
                    Some(unit) => units.entry(repo_id).or_default().push(unit),
                    None => tracing::warn!("Unknown unit type '{unit}' on repo {repo_id}"),
                }
            }
        }

        Ok(units)
    }

    fn list_licenses_for_repos(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        let conn = self.conn();
        let mut licenses: HashMap<i64, Vec<String>> = HashMap::new();

        for chunk in ids.chunks(ID_BATCH) {
            let mut stmt = conn.prepare(&format!(
                "SELECT repo_id, license FROM repo_licenses WHERE repo_id IN ({})
                 ORDER BY repo_id, license",
                placeholders(chunk.len())
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (repo_id, license) = row?;
                licenses.entry(repo_id).or_default().push(license);
            }
        }

        Ok(licenses)
    }

    fn transaction(&self, f: &mut dyn FnMut(&Tx<'_>) -> Result<()>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Dropping `tx` without commit rolls back.
        f(&Tx::new(&tx))?;

        tx.commit()?;
        Ok(())
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
