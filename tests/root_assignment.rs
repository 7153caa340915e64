//! Subject root assignment, fork-tree limits and repository lifecycle against
//! a real SQLite store.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use forkwiki::error::Error;
use forkwiki::fork::{
    ForkTreeLimiter, RootAssignment, assign_root, create_repository, delete_repository,
    fork_repository, record_push,
};
use forkwiki::store::{RepoLookup, Store};

use common::{article, reload, store, unlimited, user};

#[test]
fn first_article_becomes_root() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");

    let root = create_repository(store.as_ref(), &alice, "moon", Some("The Moon")).unwrap();
    let outcome = record_push(store.as_ref(), &unlimited(), root.id).unwrap();
    assert!(outcome.first_content);
    assert_eq!(outcome.assignment, Some(RootAssignment::Root));

    let second = create_repository(store.as_ref(), &bob, "moon", Some("the moon")).unwrap();
    assert_eq!(second.subject_id, root.subject_id);
    let outcome = record_push(store.as_ref(), &unlimited(), second.id).unwrap();
    assert_eq!(
        outcome.assignment,
        Some(RootAssignment::Forked { root_id: root.id })
    );

    let second = reload(store.as_ref(), second.id);
    assert!(second.is_fork);
    assert_eq!(second.fork_id, root.id);
    assert_eq!(reload(store.as_ref(), root.id).num_forks, 1);

    // Later pushes do not rerun the transition.
    let outcome = record_push(store.as_ref(), &unlimited(), second.id).unwrap();
    assert!(!outcome.first_content);
    assert_eq!(outcome.assignment, None);
}

#[test]
fn assignment_is_idempotent() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");

    let root = article(store.as_ref(), &alice, "moon", Some("Moon"));
    let fork = article(store.as_ref(), &bob, "moon", Some("Moon"));

    assert_eq!(
        assign_root(store.as_ref(), &unlimited(), fork.id).unwrap(),
        RootAssignment::AlreadyFork { parent_id: root.id }
    );
    assert_eq!(
        assign_root(store.as_ref(), &unlimited(), root.id).unwrap(),
        RootAssignment::Root
    );
    assert_eq!(reload(store.as_ref(), root.id).num_forks, 1);
}

#[test]
fn concurrent_first_commits_elect_one_root() {
    const WRITERS: usize = 8;

    let store = store();
    let repos: Vec<_> = (0..WRITERS)
        .map(|i| {
            let owner = user(store.as_ref(), &format!("user{i}"));
            create_repository(store.as_ref(), &owner, "moon", Some("The Moon")).unwrap()
        })
        .collect();

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = repos
        .iter()
        .map(|repo| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let id = repo.id;
            thread::spawn(move || {
                barrier.wait();
                record_push(store.as_ref(), &unlimited(), id).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().assignment.unwrap())
        .collect();

    let roots: Vec<i64> = repos
        .iter()
        .map(|r| reload(store.as_ref(), r.id))
        .filter(|r| !r.is_fork)
        .map(|r| r.id)
        .collect();
    assert_eq!(roots.len(), 1);
    let root_id = roots[0];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RootAssignment::Root)
            .count(),
        1
    );
    for repo in &repos {
        let repo = reload(store.as_ref(), repo.id);
        if repo.id != root_id {
            assert_eq!(repo.fork_id, root_id);
        }
    }
    assert_eq!(
        reload(store.as_ref(), root_id).num_forks,
        (WRITERS - 1) as i64
    );
}

#[test]
fn empty_repositories_never_fork() {
    let store = store();
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let owner = store.create_user(&format!("user{i}")).unwrap();
                create_repository(store.as_ref(), &owner, "moon", Some("Moon")).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let repo = handle.join().unwrap();
        assert_eq!(
            assign_root(store.as_ref(), &unlimited(), repo.id).unwrap(),
            RootAssignment::NotApplicable
        );
        let repo = reload(store.as_ref(), repo.id);
        assert!(!repo.is_fork);
        assert_eq!(repo.fork_id, 0);
    }
    assert!(store.find_subject_root(1, 0).unwrap().is_none());
}

#[test]
fn one_repository_per_subject_per_owner() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");

    let root = article(store.as_ref(), &alice, "moon", Some("Moon"));
    let existing = create_repository(store.as_ref(), &bob, "luna", Some("Moon")).unwrap();

    let err = create_repository(store.as_ref(), &bob, "moon-2", Some("MOON")).unwrap_err();
    assert!(matches!(
        err,
        Error::UserOwnsSubjectRepo { existing_repo_id, .. } if existing_repo_id == existing.id
    ));

    let err = fork_repository(store.as_ref(), &unlimited(), &bob, root.id, None).unwrap_err();
    assert!(matches!(err, Error::UserOwnsSubjectRepo { .. }));
    assert!(err.to_string().contains(&existing.id.to_string()));
}

#[test]
fn fork_guards() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let notes = article(store.as_ref(), &alice, "notes", None);

    let err = fork_repository(store.as_ref(), &unlimited(), &alice, notes.id, None).unwrap_err();
    assert!(matches!(err, Error::CannotForkOwnRepo));

    let fork = fork_repository(store.as_ref(), &unlimited(), &bob, notes.id, None).unwrap();
    assert_eq!(fork.name, "notes");
    assert!(fork.is_fork);
    assert!(!fork.is_empty);

    let err = fork_repository(store.as_ref(), &unlimited(), &bob, notes.id, Some("other"))
        .unwrap_err();
    assert!(matches!(err, Error::ForkAlreadyExist { fork_id, .. } if fork_id == fork.id));
}

#[test]
fn tree_size_limit() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let carol = user(store.as_ref(), "carol");
    let root = article(store.as_ref(), &alice, "notes", None);

    let err = fork_repository(store.as_ref(), &ForkTreeLimiter::new(0), &bob, root.id, None)
        .unwrap_err();
    assert!(matches!(err, Error::ForkTreeTooLarge { limit: 0 }));

    let bob_fork = fork_repository(store.as_ref(), &unlimited(), &bob, root.id, None).unwrap();

    // The tree now holds two repositories.
    let err = fork_repository(
        store.as_ref(),
        &ForkTreeLimiter::new(2),
        &carol,
        bob_fork.id,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::ForkTreeTooLarge { limit: 2 }));

    fork_repository(store.as_ref(), &ForkTreeLimiter::new(3), &carol, bob_fork.id, None).unwrap();
    assert_eq!(reload(store.as_ref(), bob_fork.id).num_forks, 1);
}

#[test]
fn full_tree_leaves_a_second_root() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");

    article(store.as_ref(), &alice, "moon", Some("Moon"));
    let repo = create_repository(store.as_ref(), &bob, "moon", Some("Moon")).unwrap();

    let outcome = record_push(store.as_ref(), &ForkTreeLimiter::new(1), repo.id).unwrap();
    assert!(matches!(
        outcome.assignment,
        Some(RootAssignment::LimitExceeded { .. })
    ));

    let repo = reload(store.as_ref(), repo.id);
    assert!(!repo.is_fork);
    assert!(!repo.is_empty);
}

#[test]
fn deleting_the_root_reconverges() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");
    let carol = user(store.as_ref(), "carol");

    let root = article(store.as_ref(), &alice, "moon", Some("Moon"));
    let older = article(store.as_ref(), &bob, "moon", Some("Moon"));
    let newer = article(store.as_ref(), &carol, "moon", Some("Moon"));
    assert_eq!(older.fork_id, root.id);
    assert_eq!(newer.fork_id, root.id);

    let outcome = delete_repository(store.as_ref(), &unlimited(), root.id).unwrap();
    assert_eq!(outcome.detached.len(), 2);
    assert!(store.get_repo_by_id(root.id).unwrap().is_none());

    let older = reload(store.as_ref(), older.id);
    let newer = reload(store.as_ref(), newer.id);
    assert!(!older.is_fork);
    assert_eq!(newer.fork_id, older.id);
    assert_eq!(older.num_forks, 1);
}

#[test]
fn deleting_a_fork_decrements_parent() {
    let store = store();
    let alice = user(store.as_ref(), "alice");
    let bob = user(store.as_ref(), "bob");

    let root = article(store.as_ref(), &alice, "notes", None);
    let fork = fork_repository(store.as_ref(), &unlimited(), &bob, root.id, None).unwrap();
    assert_eq!(reload(store.as_ref(), root.id).num_forks, 1);

    let outcome = delete_repository(store.as_ref(), &unlimited(), fork.id).unwrap();
    assert!(outcome.detached.is_empty());
    assert_eq!(reload(store.as_ref(), root.id).num_forks, 0);
}
