use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContributorStats, Repo, Subject};

/// Order of the direct forks listed under a node. All keys sort descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Updated,
    Created,
    Stars,
    Forks,
}

impl SortKey {
    /// Unrecognized keys fall back to `Updated`.
    #[must_use]
    pub fn parse(s: &str) -> SortKey {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => SortKey::Created,
            "stars" => SortKey::Stars,
            "forks" => SortKey::Forks,
            _ => SortKey::Updated,
        }
    }
}

impl From<String> for SortKey {
    fn from(s: String) -> Self {
        SortKey::parse(&s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    pub include_contributors: bool,
    pub contributor_window_days: u32,
    pub max_depth: Option<usize>,
    pub include_private: bool,
    pub sort: SortKey,
    pub page: u32,
    pub limit: Option<u32>,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            include_contributors: false,
            contributor_window_days: 90,
            max_depth: None,
            include_private: false,
            sort: SortKey::Updated,
            page: 1,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerSummary {
    pub id: i64,
    pub name: String,
}

/// Externally facing view of a repository inside a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoSummary {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub fork_id: i64,
    pub is_empty: bool,
    pub num_forks: i64,
    pub num_stars: i64,
    pub units: Vec<String>,
    pub licenses: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub level: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepoSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributors: Option<ContributorStats>,
    pub children: Vec<GraphNode>,
    /// Internal reference, replaced by `repository` once batch loading is done.
    #[serde(skip)]
    pub repo: Option<Repo>,
}

impl GraphNode {
    #[must_use]
    pub fn new(repo: Repo, level: usize) -> Self {
        Self {
            id: repo.id,
            level,
            repository: None,
            contributors: None,
            children: Vec::new(),
            repo: Some(repo),
        }
    }

    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(GraphNode::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphStatus {
    Ready,
    /// The subject has no article with content yet.
    NoRoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Disabled,
    Hit,
    Miss,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphMetadata {
    pub total_forks: i64,
    pub visible_forks: usize,
    pub max_depth_reached: bool,
    pub cycles_detected: Vec<i64>,
    pub cache_status: CacheStatus,
    pub generated_at: DateTime<Utc>,
    pub contributor_window_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphResponse {
    pub status: GraphStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<GraphNode>,
    pub metadata: GraphMetadata,
    pub pagination: Pagination,
}
