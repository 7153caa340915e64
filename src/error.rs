use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found")]
    NotFound,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("subject slug already exists: {slug}")]
    SlugAlreadyExists { slug: String },

    #[error("subject does not exist [id: {id}]")]
    SubjectNotExist { id: i64 },

    #[error("subject {id} is still used by {repos} repositories")]
    SubjectInUse { id: i64, repos: i64 },

    #[error("repository already exists: {name}")]
    RepoAlreadyExists { name: String },

    #[error("fork tree has reached its limit of {limit} repositories")]
    ForkTreeTooLarge { limit: i64 },

    #[error(
        "user {user_id} already owns repository {existing_repo_id} for subject {subject_id}; \
         submit changes from that repository instead"
    )]
    UserOwnsSubjectRepo {
        user_id: i64,
        subject_id: i64,
        existing_repo_id: i64,
    },

    #[error("repository {repo_id} is already forked by this user as repository {fork_id}")]
    ForkAlreadyExist { repo_id: i64, fork_id: i64 },

    #[error("cannot fork a repository you own")]
    CannotForkOwnRepo,

    #[error("fork cycle detected at repository {repo_id}")]
    CycleDetected { repo_id: i64 },

    #[error("fork graph exceeds the limit of {limit} nodes")]
    TooManyNodes { limit: usize },

    #[error("fork graph processing exceeded {timeout:?}")]
    ProcessingTimeout { timeout: Duration },
}

impl Error {
    /// Build failures that protect shared resources; the caller may retry later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TooManyNodes { .. } | Error::ProcessingTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
