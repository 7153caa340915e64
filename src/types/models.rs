use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A shared topic linking independently owned repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A repository row. `fork_id == 0` exactly when `is_fork` is false;
/// `subject_id == 0` means the repository belongs to no subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub fork_id: i64,
    pub subject_id: i64,
    pub is_empty: bool,
    pub num_forks: i64,
    pub num_stars: i64,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_BRANCH: &str = "main";

impl Repo {
    /// A new, empty, non-fork repository. The id is assigned on insert.
    #[must_use]
    pub fn new(owner_id: i64, name: impl Into<String>, subject_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            owner_id,
            name: name.into(),
            description: None,
            is_private: false,
            is_fork: false,
            fork_id: 0,
            subject_id,
            is_empty: true,
            num_forks: 0,
            num_stars: 0,
            default_branch: DEFAULT_BRANCH.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A non-fork, non-empty repository of a subject is that subject's root.
    #[must_use]
    pub fn is_subject_root(&self) -> bool {
        self.subject_id != 0 && !self.is_fork && !self.is_empty
    }

    #[must_use]
    pub fn has_subject(&self) -> bool {
        self.subject_id != 0
    }
}

/// Feature areas a repository exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Code,
    Issues,
    PullRequests,
    Wiki,
    Releases,
}

impl UnitType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UnitType::Code => "code",
            UnitType::Issues => "issues",
            UnitType::PullRequests => "pull_requests",
            UnitType::Wiki => "wiki",
            UnitType::Releases => "releases",
        }
    }

    pub fn parse(s: &str) -> Option<UnitType> {
        match s {
            "code" => Some(UnitType::Code),
            "issues" => Some(UnitType::Issues),
            "pull_requests" => Some(UnitType::PullRequests),
            "wiki" => Some(UnitType::Wiki),
            "releases" => Some(UnitType::Releases),
            _ => None,
        }
    }
}
