//! Subject registry: canonical topic identity shared by many repositories.

mod slug;

pub use slug::{PLACEHOLDER_SLUG, SLUG_MAX_LEN, slugify};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Subject;

const MAX_NAME_LEN: usize = 255;

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest("Subject name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::BadRequest(format!(
            "Subject name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

/// Creates a subject; fails with `SlugAlreadyExists` if the derived slug is taken.
pub fn create_subject(store: &dyn Store, name: &str) -> Result<Subject> {
    let name = validate_name(name)?;
    store.insert_subject(name, &slugify(name))
}

/// Returns the subject for `name`, creating it on first use.
///
/// Safe under concurrent first use: the insert is a no-op when another caller
/// won the race, and the row is then re-read by slug.
pub fn get_or_create_subject(store: &dyn Store, name: &str) -> Result<Subject> {
    let name = validate_name(name)?;
    let slug = slugify(name);

    if let Some(subject) = store.get_subject_by_slug(&slug)? {
        return Ok(subject);
    }

    if store.insert_subject_if_absent(name, &slug)? {
        tracing::info!("Created subject '{name}' ({slug})");
    }

    store
        .get_subject_by_slug(&slug)?
        .ok_or_else(|| Error::Internal(format!("subject '{slug}' vanished after insert")))
}

pub fn get_subject(store: &dyn Store, id: i64) -> Result<Subject> {
    store.get_subject(id)?.ok_or(Error::SubjectNotExist { id })
}

/// Renames a subject. The slug follows the name.
pub fn rename_subject(store: &dyn Store, id: i64, new_name: &str) -> Result<Subject> {
    let name = validate_name(new_name)?;
    let slug = slugify(name);
    store.update_subject(id, name, &slug)?;
    get_subject(store, id)
}

/// Deletes a subject no repository references any more.
pub fn delete_subject(store: &dyn Store, id: i64) -> Result<()> {
    let repos = store.count_subject_repos(id)?;
    if repos > 0 {
        return Err(Error::SubjectInUse { id, repos });
    }
    if !store.delete_subject(id)? {
        return Err(Error::SubjectNotExist { id });
    }
    Ok(())
}

/// Subjects similar to `query`: exact prefix matches first, then matches at a
/// word boundary, then any substring. Ties go to the most recently updated.
pub fn search_subjects(store: &dyn Store, query: &str, limit: usize) -> Result<Vec<Subject>> {
    let query = query.trim().to_lowercase();
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let query_slug = slugify(&query);
    let query_slug = if query_slug == PLACEHOLDER_SLUG {
        String::new()
    } else {
        query_slug
    };

    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    store.search_subjects(&query, &query_slug, limit)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::store::SqliteStore;
    use crate::types::Repo;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    #[test]
    fn test_create_subject_rejects_slug_collision() {
        let store = store();
        let moon = create_subject(&store, "The Moon").unwrap();
        assert_eq!(moon.slug, "the-moon");

        let result = create_subject(&store, "the  moon!");
        assert!(matches!(result, Err(Error::SlugAlreadyExists { slug }) if slug == "the-moon"));
    }

    #[test]
    fn test_create_subject_rejects_empty_name() {
        let store = store();
        assert!(matches!(
            create_subject(&store, "   "),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = store();
        let first = get_or_create_subject(&store, "Café Français").unwrap();
        let second = get_or_create_subject(&store, "cafe francais").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Café Français");
        assert_eq!(first.slug, "cafe-francais");
    }

    #[test]
    fn test_get_or_create_concurrent_first_use() {
        let store = Arc::new(store());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || get_or_create_subject(store.as_ref(), "The Moon").unwrap())
            })
            .collect();

        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap().id).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM subjects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rename_subject() {
        let store = store();
        let moon = create_subject(&store, "Moon").unwrap();
        create_subject(&store, "Mars").unwrap();

        let renamed = rename_subject(&store, moon.id, "The Moon").unwrap();
        assert_eq!(renamed.slug, "the-moon");

        let clash = rename_subject(&store, moon.id, "MARS");
        assert!(matches!(clash, Err(Error::SlugAlreadyExists { .. })));

        let missing = rename_subject(&store, 999, "Venus");
        assert!(matches!(missing, Err(Error::SubjectNotExist { id: 999 })));
    }

    #[test]
    fn test_delete_subject_in_use() {
        let store = store();
        let user = store.create_user("alice").unwrap();
        let moon = create_subject(&store, "Moon").unwrap();
        let repo = store.create_repo(&Repo::new(user.id, "moon", moon.id)).unwrap();

        let result = delete_subject(&store, moon.id);
        assert!(matches!(result, Err(Error::SubjectInUse { repos: 1, .. })));

        store
            .transaction(&mut |tx| tx.delete_repo(repo.id).map(|_| ()))
            .unwrap();
        delete_subject(&store, moon.id).unwrap();
        assert!(matches!(
            delete_subject(&store, moon.id),
            Err(Error::SubjectNotExist { .. })
        ));
    }

    #[test]
    fn test_search_ranking() {
        let store = store();
        let substring = create_subject(&store, "Honeymoon").unwrap();
        let word = create_subject(&store, "Blue Moon").unwrap();
        let prefix = create_subject(&store, "Moon Landing").unwrap();
        create_subject(&store, "Mars").unwrap();

        let results = search_subjects(&store, "moon", 10).unwrap();
        let ids: Vec<i64> = results.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![prefix.id, word.id, substring.id]);

        assert_eq!(search_subjects(&store, "moon", 1).unwrap().len(), 1);
        assert!(search_subjects(&store, "  ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_ties_prefer_recent() {
        let store = store();
        let older = create_subject(&store, "Moon A").unwrap();
        let newer = create_subject(&store, "Moon B").unwrap();
        store
            .connection()
            .execute(
                "UPDATE subjects SET updated_at = '2020-01-01T00:00:00.000000Z' WHERE id = ?1",
                [older.id],
            )
            .unwrap();

        let results = search_subjects(&store, "moon", 10).unwrap();
        assert_eq!(results[0].id, newer.id);
        assert_eq!(results[1].id, older.id);
    }

    #[test]
    fn test_search_prefix_beats_many_recent_substrings() {
        let store = store();
        let landing = create_subject(&store, "Moon Landing").unwrap();
        store
            .connection()
            .execute(
                "UPDATE subjects SET updated_at = '2000-01-01T00:00:00.000000Z' WHERE id = ?1",
                [landing.id],
            )
            .unwrap();
        for i in 0..250 {
            create_subject(&store, &format!("Honeymoon {i}")).unwrap();
        }

        let results = search_subjects(&store, "moon", 10).unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].id, landing.id);
        assert!(results[1..].iter().all(|s| s.name.starts_with("Honeymoon")));
    }

    #[test]
    fn test_search_matches_without_diacritics() {
        let store = store();
        let cafe = create_subject(&store, "Café Français").unwrap();

        let results = search_subjects(&store, "francais", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, cafe.id);
    }
}
