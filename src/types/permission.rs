use serde::Serialize;

use super::Repo;

/// What an actor may do with a repository they are looking at.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EditPermissions {
    pub is_owner: bool,
    pub can_edit_directly: bool,
    pub needs_fork: bool,
    pub has_existing_fork: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_fork: Option<Repo>,
    pub blocked_by_subject: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_repo_for_subject: Option<Repo>,
    /// Change requests commit to a branch of the original repository, so they
    /// do not depend on the actor having a fork.
    pub can_submit_change_request: bool,
}

impl EditPermissions {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owner() -> Self {
        Self {
            is_owner: true,
            can_edit_directly: true,
            ..Self::default()
        }
    }
}
