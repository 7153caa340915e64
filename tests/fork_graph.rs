//! Fork graph building over a real SQLite store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use forkwiki::config::GraphConfig;
use forkwiki::error::{Error, Result};
use forkwiki::fork::{create_repository, fork_repository};
use forkwiki::graph::ForkGraphBuilder;
use forkwiki::stats::{
    CacheCoordinator, ContributorStatsCache, MemoryCache, PrimaryStats, StatsGenerator,
};
use forkwiki::store::{SqliteStore, Store};
use forkwiki::types::{
    CacheStatus, ContributorActivity, GraphNode, GraphParams, GraphResponse, GraphStatus, Repo,
    SortKey, UnitType, User, WeeklyCommits,
};
use tokio_util::sync::CancellationToken;

use common::{article, point_fork, reload, store, unlimited, user};

fn build(store: &SqliteStore, repo: &Repo, params: &GraphParams) -> Result<GraphResponse> {
    let config = GraphConfig::default();
    ForkGraphBuilder::new(store, None, &config).build(repo, params, None, &CancellationToken::new())
}

fn child_ids(node: &GraphNode) -> Vec<i64> {
    node.children.iter().map(|c| c.id).collect()
}

/// alice's root with forks by bob, carol and dave, in that order.
fn fan_out(store: &SqliteStore) -> (Repo, Vec<Repo>) {
    let alice = user(store, "alice");
    let root = article(store, &alice, "notes", None);
    let forks = ["bob", "carol", "dave"]
        .iter()
        .map(|name| {
            let owner = user(store, name);
            fork_repository(store, &unlimited(), &owner, root.id, None).unwrap()
        })
        .collect();
    (reload(store, root.id), forks)
}

#[test]
fn subject_graph_starts_at_the_root() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let carol = user(store.as_ref(), "carol");

    let root = article(store.as_ref(), &alice, "moon", Some("The Moon"));
    let fork = article(store.as_ref(), &bob, "moon", Some("The Moon"));
    let nested = fork_repository(store.as_ref(), &unlimited(), &carol, fork.id, None).unwrap();

    // Asking from a leaf still renders the whole subject.
    let graph = build(&store, &nested, &GraphParams::default()).unwrap();
    assert_eq!(graph.status, GraphStatus::Ready);

    let tree = graph.root.unwrap();
    assert_eq!(tree.id, root.id);
    assert_eq!(child_ids(&tree), vec![fork.id]);
    assert_eq!(child_ids(&tree.children[0]), vec![nested.id]);
    assert_eq!(tree.children[0].children[0].level, 2);

    assert_eq!(graph.metadata.total_forks, 1);
    assert_eq!(graph.metadata.visible_forks, 2);
    assert!(!graph.metadata.max_depth_reached);
    assert_eq!(graph.metadata.cache_status, CacheStatus::Disabled);
}

#[test]
fn subject_without_root_is_an_empty_graph() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let draft = create_repository(store.as_ref(), &alice, "moon", Some("Moon")).unwrap();

    let graph = build(&store, &draft, &GraphParams::default()).unwrap();
    assert_eq!(graph.status, GraphStatus::NoRoot);
    assert!(graph.root.is_none());
    assert_eq!(graph.metadata.visible_forks, 0);
    assert!(!graph.pagination.has_more);
}

#[test]
fn persisted_cycle_is_skipped_and_reported() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let a = article(store.as_ref(), &alice, "a", None);
    let b = article(store.as_ref(), &bob, "b", None);
    point_fork(&store, a.id, b.id);
    point_fork(&store, b.id, a.id);

    let a = reload(store.as_ref(), a.id);
    let graph = build(&store, &a, &GraphParams::default()).unwrap();

    let tree = graph.root.unwrap();
    assert_eq!(tree.id, a.id);
    assert_eq!(child_ids(&tree), vec![b.id]);
    assert!(tree.children[0].children.is_empty());
    assert_eq!(graph.metadata.cycles_detected, vec![a.id]);
    assert_eq!(graph.metadata.visible_forks, 1);
}

#[test]
fn depth_cap_renders_leaves() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let carol = user(store.as_ref(), "carol");

    let root = article(store.as_ref(), &alice, "notes", None);
    let fork = fork_repository(store.as_ref(), &unlimited(), &bob, root.id, None).unwrap();
    fork_repository(store.as_ref(), &unlimited(), &carol, fork.id, None).unwrap();

    let params = GraphParams {
        max_depth: Some(1),
        ..GraphParams::default()
    };
    let graph = build(&store, &root, &params).unwrap();
    let tree = graph.root.unwrap();
    assert_eq!(child_ids(&tree), vec![fork.id]);
    assert!(tree.children[0].children.is_empty());
    assert!(graph.metadata.max_depth_reached);

    let params = GraphParams {
        max_depth: Some(2),
        ..GraphParams::default()
    };
    let graph = build(&store, &root, &params).unwrap();
    assert!(!graph.metadata.max_depth_reached);
    assert_eq!(graph.metadata.visible_forks, 2);
}

#[test]
fn node_budget_aborts_the_build() {
    let store = store();
    let (root, _) = fan_out(&store);

    let config = GraphConfig {
        max_nodes: 3,
        ..GraphConfig::default()
    };
    let result = ForkGraphBuilder::new(store.as_ref(), None, &config).build(
        &root,
        &GraphParams::default(),
        None,
        &CancellationToken::new(),
    );
    assert!(matches!(result, Err(Error::TooManyNodes { limit: 3 })));
}

#[test]
fn cancellation_reports_timeout() {
    let store = store();
    let (root, _) = fan_out(&store);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let config = GraphConfig::default();
    let result = ForkGraphBuilder::new(store.as_ref(), None, &config).build(
        &root,
        &GraphParams::default(),
        None,
        &cancel,
    );
    let err = result.unwrap_err();
    assert!(matches!(err, Error::ProcessingTimeout { .. }));
    assert!(err.is_retryable());
}

/// Takes longer than a one-second processing budget for every repository.
struct SlowGenerator;

impl StatsGenerator for SlowGenerator {
    fn weekly_stats(&self, _repo: &Repo) -> Result<PrimaryStats> {
        std::thread::sleep(Duration::from_millis(1_100));
        Ok(PrimaryStats::Ready(Vec::new()))
    }
}

#[test]
fn slow_build_runs_out_of_time() {
    let store = store();
    let (root, _) = fan_out(&store);

    let stats = ContributorStatsCache::new(
        Arc::new(SlowGenerator),
        None,
        CacheCoordinator::new(),
        Duration::from_secs(600),
    );
    let config = GraphConfig {
        processing_timeout_secs: 1,
        ..GraphConfig::default()
    };
    let params = GraphParams {
        include_contributors: true,
        ..GraphParams::default()
    };

    let result = ForkGraphBuilder::new(store.as_ref(), Some(&stats), &config).build(
        &root,
        &params,
        None,
        &CancellationToken::new(),
    );
    assert!(matches!(
        result,
        Err(Error::ProcessingTimeout { timeout }) if timeout == Duration::from_secs(1)
    ));
}

#[test]
fn pagination_applies_to_root_forks() {
    let store = store();
    let (root, forks) = fan_out(&store);

    let mut params = GraphParams {
        sort: SortKey::Created,
        limit: Some(2),
        ..GraphParams::default()
    };
    let graph = build(&store, &root, &params).unwrap();
    assert_eq!(child_ids(graph.root.as_ref().unwrap()), vec![forks[2].id, forks[1].id]);
    assert_eq!(graph.pagination.total, 3);
    assert!(graph.pagination.has_more);
    assert_eq!(graph.metadata.total_forks, 3);
    assert_eq!(graph.metadata.visible_forks, 2);

    params.page = 2;
    let graph = build(&store, &root, &params).unwrap();
    assert_eq!(child_ids(graph.root.as_ref().unwrap()), vec![forks[0].id]);
    assert!(!graph.pagination.has_more);
}

#[test]
fn sort_by_stars() {
    let store = store();
    let (root, forks) = fan_out(&store);
    store
        .connection()
        .execute("UPDATE repos SET num_stars = 9 WHERE id = ?1", [forks[1].id])
        .unwrap();

    let params = GraphParams {
        sort: SortKey::Stars,
        ..GraphParams::default()
    };
    let graph = build(&store, &root, &params).unwrap();
    assert_eq!(child_ids(graph.root.as_ref().unwrap())[0], forks[1].id);
}

#[test]
fn private_forks_need_visibility() {
    let store = store();
    let (root, forks) = fan_out(&store);
    store
        .connection()
        .execute("UPDATE repos SET is_private = 1 WHERE id = ?1", [forks[0].id])
        .unwrap();
    let owner = store.get_user(forks[0].owner_id).unwrap().unwrap();
    let config = GraphConfig::default();
    let builder = ForkGraphBuilder::new(store.as_ref(), None, &config);
    let cancel = CancellationToken::new();

    let anonymous = builder.build(&root, &GraphParams::default(), None, &cancel).unwrap();
    assert_eq!(anonymous.metadata.visible_forks, 2);
    assert_eq!(anonymous.metadata.total_forks, 3);

    let as_owner = builder
        .build(&root, &GraphParams::default(), Some(&owner), &cancel)
        .unwrap();
    assert_eq!(as_owner.metadata.visible_forks, 3);

    let params = GraphParams {
        include_private: true,
        ..GraphParams::default()
    };
    let all = builder.build(&root, &params, None, &cancel).unwrap();
    assert_eq!(all.metadata.visible_forks, 3);
}

#[test]
fn nodes_carry_batch_loaded_details() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let root = article(store.as_ref(), &alice, "moon", Some("The Moon"));
    let fork = article(store.as_ref(), &bob, "moon", Some("The Moon"));
    store
        .set_repo_units(root.id, &[UnitType::Code, UnitType::Wiki])
        .unwrap();
    store
        .set_repo_licenses(fork.id, &["CC-BY-SA-4.0".to_string()])
        .unwrap();

    let graph = build(&store, &fork, &GraphParams::default()).unwrap();
    let tree = graph.root.unwrap();
    assert!(tree.repo.is_none());

    let summary = tree.repository.as_ref().unwrap();
    assert_eq!(summary.full_name, "alice/moon");
    assert_eq!(summary.owner.as_ref().unwrap().name, "alice");
    assert_eq!(summary.subject.as_ref().unwrap().slug, "the-moon");
    assert_eq!(summary.units, vec!["code", "wiki"]);

    let child = tree.children[0].repository.as_ref().unwrap();
    assert_eq!(child.full_name, "bob/moon");
    assert_eq!(child.licenses, vec!["CC-BY-SA-4.0"]);

    let json = serde_json::to_value(&tree).unwrap();
    assert!(json.get("repo").is_none());
    assert_eq!(json["repository"]["full_name"], "alice/moon");
}

struct OneContributor;

impl StatsGenerator for OneContributor {
    fn weekly_stats(&self, _repo: &Repo) -> Result<PrimaryStats> {
        Ok(PrimaryStats::Ready(vec![ContributorActivity {
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            total_commits: 1,
            // 2023-11-19, long before any fork in these tests.
            weeks: vec![WeeklyCommits {
                week: 1_700_352_000,
                commits: 1,
            }],
        }]))
    }
}

#[test]
fn contributors_are_scoped_to_fork_creation() {
    let store = store();
    let (root, _) = fan_out(&store);

    let stats = ContributorStatsCache::new(
        Arc::new(OneContributor),
        Some(Arc::new(MemoryCache::new())),
        CacheCoordinator::new(),
        Duration::from_secs(600),
    );
    let config = GraphConfig::default();
    let builder = ForkGraphBuilder::new(store.as_ref(), Some(&stats), &config);
    let params = GraphParams {
        include_contributors: true,
        contributor_window_days: 36_500,
        ..GraphParams::default()
    };

    let graph = builder
        .build(&root, &params, None, &CancellationToken::new())
        .unwrap();
    let tree = graph.root.unwrap();
    assert_eq!(tree.contributors.unwrap().total_count, 1);
    for child in &tree.children {
        assert_eq!(child.contributors.unwrap().total_count, 0);
    }
    assert_eq!(graph.metadata.cache_status, CacheStatus::Miss);
    // Oversized windows are capped, keeping the key space bounded.
    assert_eq!(
        graph.metadata.contributor_window_days,
        config.max_contributor_window_days
    );

    let again = builder
        .build(&root, &params, None, &CancellationToken::new())
        .unwrap();
    assert_eq!(again.metadata.cache_status, CacheStatus::Hit);
}

#[test]
fn subjectless_chain_walks_to_its_top() {
    let store = store();
    let (root, forks) = fan_out(&store);
    let erin: User = user(store.as_ref(), "erin");
    let leaf = fork_repository(store.as_ref(), &unlimited(), &erin, forks[0].id, None).unwrap();

    let graph = build(&store, &leaf, &GraphParams::default()).unwrap();
    assert_eq!(graph.root.unwrap().id, root.id);
    assert_eq!(graph.metadata.visible_forks, 4);
}
