//! In-memory repository snapshot with copy-on-write replacement.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use color_eyre::{eyre::eyre, Result};

use super::storage::{NoopStorage, RepositoryStorage};
use crate::github::CachedRepository;

pub type Snapshot = Arc<Vec<CachedRepository>>;

/// The cached repository set.
///
/// Readers clone the current `Arc` and never see a partially replaced set:
/// [`RepositoryCache::replace_all`] builds and persists the new set first and
/// then swaps the pointer in one write.
pub struct RepositoryCache {
  snapshot: RwLock<Snapshot>,
  storage: Box<dyn RepositoryStorage>,
  /// Serializes persist+swap so two replaces cannot interleave.
  writer: Mutex<()>,
}

impl RepositoryCache {
  /// Create a cache seeded from whatever `storage` already holds.
  pub fn open(storage: impl RepositoryStorage + 'static) -> Result<Self> {
    let initial = storage.load_all()?;

    Ok(Self {
      snapshot: RwLock::new(Arc::new(initial)),
      storage: Box::new(storage),
      writer: Mutex::new(()),
    })
  }

  /// Cache without persistence.
  pub fn in_memory() -> Self {
    Self {
      snapshot: RwLock::new(Arc::new(Vec::new())),
      storage: Box::new(NoopStorage),
      writer: Mutex::new(()),
    }
  }

  /// Current complete set.
  pub fn snapshot(&self) -> Snapshot {
    // The guarded value is only ever a whole Arc, so a poisoned lock still
    // holds a consistent set.
    Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
  }

  pub fn is_empty(&self) -> bool {
    self.snapshot().is_empty()
  }

  pub fn len(&self) -> usize {
    self.snapshot().len()
  }

  /// Discard the current set and install `repos`.
  ///
  /// If persisting fails the current set stays in place.
  pub fn replace_all(&self, repos: Vec<CachedRepository>) -> Result<Snapshot> {
    let _writer = self
      .writer
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    self.storage.replace_all(&repos)?;

    let next = Arc::new(repos);
    *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
    Ok(next)
  }

  pub fn find_all(&self) -> Vec<CachedRepository> {
    self.snapshot().to_vec()
  }

  /// Repositories matching `predicate`, in snapshot order.
  pub fn find_by<P>(&self, predicate: P) -> Vec<CachedRepository>
  where
    P: Fn(&CachedRepository) -> bool,
  {
    self
      .snapshot()
      .iter()
      .filter(|&repo| predicate(repo))
      .cloned()
      .collect()
  }

  /// Exact, case-sensitive language match.
  pub fn find_by_language(&self, language: &str) -> Vec<CachedRepository> {
    self.find_by(|repo| repo.language == language)
  }

  /// Case-insensitive substring match on name or description.
  pub fn find_by_search_term(&self, term: &str) -> Vec<CachedRepository> {
    let needle = term.to_lowercase();
    self.find_by(|repo| repo.matches_search(&needle))
  }

  /// Sorted, de-duplicated languages present in the snapshot.
  pub fn distinct_languages(&self) -> Vec<String> {
    self
      .snapshot()
      .iter()
      .filter(|repo| !repo.language.is_empty())
      .map(|repo| repo.language.clone())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::sync::testing::repo;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::thread;

  fn seeded() -> RepositoryCache {
    let cache = RepositoryCache::in_memory();
    let mut alpha = repo(1, "alpha", "Go");
    alpha.description = Some("Tiny HTTP router".to_string());
    cache
      .replace_all(vec![alpha, repo(2, "beta", "Rust"), repo(3, "gamma", "Rust")])
      .unwrap();
    cache
  }

  #[test]
  fn test_new_cache_is_empty() {
    let cache = RepositoryCache::in_memory();
    assert!(cache.is_empty());
    assert!(cache.find_all().is_empty());
    assert!(cache.distinct_languages().is_empty());
  }

  #[test]
  fn test_find_by_language_is_case_sensitive() {
    let cache = seeded();
    let names: Vec<_> = cache
      .find_by_language("Rust")
      .into_iter()
      .map(|r| r.name)
      .collect();
    assert_eq!(names, vec!["beta", "gamma"]);
    assert!(cache.find_by_language("rust").is_empty());
  }

  #[test]
  fn test_search_matches_name_or_description() {
    let cache = seeded();

    let by_name = cache.find_by_search_term("AL");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].name, "alpha");

    let by_description = cache.find_by_search_term("router");
    assert_eq!(by_description.len(), 1);
    assert_eq!(by_description[0].id, 1);

    assert!(cache.find_by_search_term("delta").is_empty());
  }

  #[test]
  fn test_distinct_languages_sorted() {
    let cache = seeded();
    assert_eq!(cache.distinct_languages(), vec!["Go", "Rust"]);
  }

  #[test]
  fn test_replace_all_swaps_whole_set() {
    let cache = seeded();
    let before = cache.snapshot();

    cache.replace_all(vec![repo(9, "omega", "C")]).unwrap();

    // Earlier readers keep their complete set.
    assert_eq!(before.len(), 3);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.find_all()[0].name, "omega");
  }

  #[test]
  fn test_open_seeds_from_storage() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.replace_all(&[repo(4, "delta", "Zig")]).unwrap();

    let cache = RepositoryCache::open(storage).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.find_all()[0].name, "delta");
  }

  #[test]
  fn test_failed_persist_keeps_snapshot() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let cache = RepositoryCache::open(storage).unwrap();
    cache.replace_all(vec![repo(1, "alpha", "Go")]).unwrap();

    let clash = vec![repo(2, "one", "Go"), repo(2, "two", "Go")];
    assert!(cache.replace_all(clash).is_err());

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.find_all()[0].name, "alpha");
  }

  #[test]
  fn test_readers_never_observe_partial_set() {
    let cache = Arc::new(RepositoryCache::in_memory());
    let old: Vec<_> = (0..50).map(|i| repo(i, "old", "Go")).collect();
    let new: Vec<_> = (100..120).map(|i| repo(i, "new", "Rust")).collect();
    cache.replace_all(old.clone()).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
      .map(|_| {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
          while !done.load(Ordering::Relaxed) {
            let seen = cache.snapshot();
            let whole_old = seen.len() == 50 && seen.iter().all(|r| r.name == "old");
            let whole_new = seen.len() == 20 && seen.iter().all(|r| r.name == "new");
            assert!(whole_old || whole_new, "observed {} mixed items", seen.len());
          }
        })
      })
      .collect();

    for round in 0..200 {
      let next = if round % 2 == 0 { new.clone() } else { old.clone() };
      cache.replace_all(next).unwrap();
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
      reader.join().unwrap();
    }
  }
}
