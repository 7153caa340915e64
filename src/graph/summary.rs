use std::collections::HashMap;

use crate::error::Result;
use crate::store::Store;
use crate::types::{GraphNode, OwnerSummary, Repo, RepoSummary, Subject, UnitType, User};

/// Related rows for every repository in a tree, loaded in bulk.
struct Related {
    owners: HashMap<i64, User>,
    subjects: HashMap<i64, Subject>,
    units: HashMap<i64, Vec<UnitType>>,
    licenses: HashMap<i64, Vec<String>>,
}

/// Replaces each node's internal repository with its public summary.
pub(super) fn attach_summaries(store: &dyn Store, tree: &mut GraphNode) -> Result<()> {
    let mut repo_ids = Vec::new();
    let mut owner_ids = Vec::new();
    let mut subject_ids = Vec::new();
    collect_ids(tree, &mut repo_ids, &mut owner_ids, &mut subject_ids);

    for ids in [&mut repo_ids, &mut owner_ids, &mut subject_ids] {
        ids.sort_unstable();
        ids.dedup();
    }

    let related = Related {
        owners: store.get_users_by_ids(&owner_ids)?,
        subjects: store.get_subjects_by_ids(&subject_ids)?,
        units: store.list_units_for_repos(&repo_ids)?,
        licenses: store.list_licenses_for_repos(&repo_ids)?,
    };

    convert(tree, &related);
    Ok(())
}

fn collect_ids(
    node: &GraphNode,
    repo_ids: &mut Vec<i64>,
    owner_ids: &mut Vec<i64>,
    subject_ids: &mut Vec<i64>,
) {
    if let Some(repo) = &node.repo {
        repo_ids.push(repo.id);
        owner_ids.push(repo.owner_id);
        if repo.has_subject() {
            subject_ids.push(repo.subject_id);
        }
    }
    for child in &node.children {
        collect_ids(child, repo_ids, owner_ids, subject_ids);
    }
}

fn convert(node: &mut GraphNode, related: &Related) {
    if let Some(repo) = node.repo.take() {
        node.repository = Some(summarize_repo(repo, related));
    }
    for child in &mut node.children {
        convert(child, related);
    }
}

fn summarize_repo(repo: Repo, related: &Related) -> RepoSummary {
    let owner = related.owners.get(&repo.owner_id).map(|u| OwnerSummary {
        id: u.id,
        name: u.name.clone(),
    });
    let full_name = match &owner {
        Some(owner) => format!("{}/{}", owner.name, repo.name),
        None => repo.name.clone(),
    };

    RepoSummary {
        id: repo.id,
        full_name,
        owner,
        subject: related.subjects.get(&repo.subject_id).cloned(),
        units: related
            .units
            .get(&repo.id)
            .map(|units| units.iter().map(|u| u.as_str().to_string()).collect())
            .unwrap_or_default(),
        licenses: related.licenses.get(&repo.id).cloned().unwrap_or_default(),
        name: repo.name,
        description: repo.description,
        is_private: repo.is_private,
        is_fork: repo.is_fork,
        fork_id: repo.fork_id,
        is_empty: repo.is_empty,
        num_forks: repo.num_forks,
        num_stars: repo.num_stars,
        created_at: repo.created_at,
        updated_at: repo.updated_at,
    }
}
