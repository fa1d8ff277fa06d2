//! Read-side façade over the synced cache.
//!
//! Every call answers with data, never with a remote failure: a broken
//! upstream degrades to the last snapshot (or an empty one).

use serde::Serialize;

use crate::github::CachedRepository;
use crate::sync::{RefreshOutcome, RepositorySource, SyncStatus, Syncer, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
  Public,
  Private,
}

/// Filters for [`RepositoryService::list_repositories`].
///
/// `search` and `language` are alternatives: when both are set, `search`
/// wins. `visibility` and `fork` narrow whatever that selection returns.
#[derive(Debug, Clone, Default)]
pub struct RepoFilter {
  pub search: Option<String>,
  pub language: Option<String>,
  pub visibility: Option<Visibility>,
  pub fork: Option<bool>,
}

/// Aggregates over the cached set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStats {
  pub total_repositories: u64,
  pub public_repositories: u64,
  pub private_repositories: u64,
  pub forked_repositories: u64,
  pub total_stars: u64,
  pub total_forks: u64,
}

impl RepoStats {
  pub fn from_repositories(repos: &[CachedRepository]) -> Self {
    repos.iter().fold(Self::default(), |mut stats, repo| {
      stats.total_repositories += 1;
      if repo.is_private {
        stats.private_repositories += 1;
      } else {
        stats.public_repositories += 1;
      }
      if repo.is_fork {
        stats.forked_repositories += 1;
      }
      stats.total_stars += repo.stargazers_count;
      stats.total_forks += repo.forks_count;
      stats
    })
  }
}

pub struct RepositoryService<S: RepositorySource> {
  syncer: Syncer<S>,
}

impl<S: RepositorySource> RepositoryService<S> {
  pub fn new(syncer: Syncer<S>) -> Self {
    Self { syncer }
  }

  pub fn syncer(&self) -> &Syncer<S> {
    &self.syncer
  }

  /// Repositories matching `filter`.
  ///
  /// Only the unfiltered selection refreshes an empty cache first.
  pub async fn list_repositories(&self, filter: &RepoFilter) -> Vec<CachedRepository> {
    let cache = self.syncer.cache();

    let mut repos = match (non_blank(&filter.search), non_blank(&filter.language)) {
      (Some(term), _) => cache.find_by_search_term(term),
      (None, Some(language)) => cache.find_by_language(language),
      (None, None) => {
        self.syncer.ensure_populated().await;
        cache.find_all()
      }
    };

    if let Some(visibility) = filter.visibility {
      let private = visibility == Visibility::Private;
      repos.retain(|repo| repo.is_private == private);
    }
    if let Some(fork) = filter.fork {
      repos.retain(|repo| repo.is_fork == fork);
    }

    repos
  }

  /// Run one refresh cycle now.
  ///
  /// The outcome says whether the data is fresh or the retained snapshot.
  pub async fn force_refresh(&self) -> RefreshOutcome {
    self.syncer.refresh(Trigger::Manual).await
  }

  pub fn list_languages(&self) -> Vec<String> {
    self.syncer.cache().distinct_languages()
  }

  pub async fn compute_stats(&self) -> RepoStats {
    self.syncer.ensure_populated().await;
    RepoStats::from_repositories(&self.syncer.cache().snapshot())
  }

  pub fn status(&self) -> SyncStatus {
    self.syncer.status()
  }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::RepositoryCache;
  use crate::error::SyncError;
  use crate::github::RemoteRecord;
  use crate::sync::testing::{record, FakeSource};
  use std::sync::atomic::Ordering;
  use std::sync::Arc;

  fn service(source: FakeSource) -> RepositoryService<FakeSource> {
    RepositoryService::new(Syncer::new(source, Arc::new(RepositoryCache::in_memory())))
  }

  fn alpha_beta() -> Vec<RemoteRecord> {
    vec![record(1, "alpha", Some("Go")), record(2, "beta", Some("Rust"))]
  }

  fn names(repos: &[CachedRepository]) -> Vec<&str> {
    repos.iter().map(|r| r.name.as_str()).collect()
  }

  #[tokio::test]
  async fn test_filters_over_cached_set() {
    let service = service(FakeSource::returning(alpha_beta()));
    service.force_refresh().await;

    assert_eq!(service.list_languages(), vec!["Go", "Rust"]);

    let by_language = service
      .list_repositories(&RepoFilter {
        language: Some("Go".to_string()),
        ..Default::default()
      })
      .await;
    assert_eq!(names(&by_language), vec!["alpha"]);

    let by_search = service
      .list_repositories(&RepoFilter {
        search: Some("AL".to_string()),
        ..Default::default()
      })
      .await;
    assert_eq!(names(&by_search), vec!["alpha"]);
  }

  #[tokio::test]
  async fn test_search_wins_over_language() {
    let service = service(FakeSource::returning(alpha_beta()));
    service.force_refresh().await;

    let repos = service
      .list_repositories(&RepoFilter {
        search: Some("beta".to_string()),
        language: Some("Go".to_string()),
        ..Default::default()
      })
      .await;
    assert_eq!(names(&repos), vec!["beta"]);
  }

  #[tokio::test]
  async fn test_blank_filters_mean_everything() {
    let service = service(FakeSource::returning(alpha_beta()));

    let repos = service
      .list_repositories(&RepoFilter {
        search: Some("   ".to_string()),
        language: Some(String::new()),
        ..Default::default()
      })
      .await;
    assert_eq!(repos.len(), 2);
  }

  #[tokio::test]
  async fn test_unfiltered_list_cold_reads_once() {
    let source = FakeSource::returning(alpha_beta());
    let fetches = source.fetch_counter();
    let service = service(source);

    assert_eq!(service.list_repositories(&RepoFilter::default()).await.len(), 2);
    assert_eq!(service.list_repositories(&RepoFilter::default()).await.len(), 2);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_filtered_lookups_do_not_cold_read() {
    let source = FakeSource::returning(alpha_beta());
    let fetches = source.fetch_counter();
    let service = service(source);

    let repos = service
      .list_repositories(&RepoFilter {
        language: Some("Go".to_string()),
        ..Default::default()
      })
      .await;

    assert!(repos.is_empty());
    assert!(service.list_languages().is_empty());
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_visibility_and_fork_narrowing() {
    let mut private_fork = record(3, "gamma", Some("Go"));
    private_fork.private = Some(true);
    private_fork.fork = Some(true);
    let mut records = alpha_beta();
    records.push(private_fork);
    let service = service(FakeSource::returning(records));

    let private = service
      .list_repositories(&RepoFilter {
        visibility: Some(Visibility::Private),
        ..Default::default()
      })
      .await;
    assert_eq!(names(&private), vec!["gamma"]);

    let public_go_sources = service
      .list_repositories(&RepoFilter {
        language: Some("Go".to_string()),
        visibility: Some(Visibility::Public),
        fork: Some(false),
        ..Default::default()
      })
      .await;
    assert_eq!(names(&public_go_sources), vec!["alpha"]);
  }

  #[tokio::test]
  async fn test_stats_scenario() {
    let mut records: Vec<_> = (1..=3)
      .map(|i| record(i, &format!("public-{i}"), Some("Go")))
      .collect();
    let mut fork = record(4, "private-fork", None);
    fork.stargazers_count = Some(0);
    fork.forks_count = Some(2);
    fork.private = Some(true);
    fork.fork = Some(true);
    records.push(fork);

    let service = service(FakeSource::returning(records));
    let stats = service.compute_stats().await;

    assert_eq!(
      stats,
      RepoStats {
        total_repositories: 4,
        public_repositories: 3,
        private_repositories: 1,
        forked_repositories: 1,
        total_stars: 6,
        total_forks: 2,
      }
    );
  }

  #[tokio::test]
  async fn test_stats_serialize_camel_case() {
    let json = serde_json::to_value(RepoStats::default()).unwrap();
    assert_eq!(json["totalRepositories"], 0);
    assert_eq!(json["forkedRepositories"], 0);
  }

  #[tokio::test]
  async fn test_outage_degrades_to_empty() {
    let service = service(FakeSource::failing(SyncError::Transport(
      "dns failure".to_string(),
    )));

    assert!(service.list_repositories(&RepoFilter::default()).await.is_empty());
    assert_eq!(service.compute_stats().await, RepoStats::default());

    let outcome = service.force_refresh().await;
    assert!(!outcome.is_fresh());
    assert!(outcome.repositories().is_empty());
  }
}
