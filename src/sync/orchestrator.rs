//! Single-flight refresh of the repository cache.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::RepositorySource;
use crate::cache::{RepositoryCache, Snapshot};
use crate::error::SyncError;
use crate::github::{CachedRepository, RemoteRecord};

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// A read found the cache empty
  ColdRead,
  /// Periodic timer tick
  Timer,
  /// Inbound webhook delivery
  Webhook,
  /// Explicit refresh request
  Manual,
}

/// Refresh state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Refreshing,
  /// The last attempt failed; the previous snapshot is still served.
  RefreshFailed {
    error: SyncError,
    snapshot_retained: bool,
  },
}

/// Result of one refresh cycle.
///
/// Both variants carry the set a caller should serve; only `Fresh` means the
/// cache was replaced.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
  Fresh(Snapshot),
  Stale { snapshot: Snapshot, error: SyncError },
}

impl RefreshOutcome {
  pub fn repositories(&self) -> &[CachedRepository] {
    match self {
      Self::Fresh(snapshot) | Self::Stale { snapshot, .. } => snapshot,
    }
  }

  pub fn is_fresh(&self) -> bool {
    matches!(self, Self::Fresh(_))
  }

  pub fn error(&self) -> Option<&SyncError> {
    match self {
      Self::Fresh(_) => None,
      Self::Stale { error, .. } => Some(error),
    }
  }
}

/// Observability view of the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncStatus {
  pub state: SyncState,
  pub last_success: Option<DateTime<Local>>,
  pub last_failure: Option<DateTime<Local>>,
  /// Remote fetches started since creation
  pub fetch_count: u64,
}

impl Default for SyncStatus {
  fn default() -> Self {
    Self {
      state: SyncState::Idle,
      last_success: None,
      last_failure: None,
      fetch_count: 0,
    }
  }
}

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Fetches, normalizes and swaps in the repository set.
///
/// Cheap to clone; clones share the cache and the in-flight refresh.
pub struct Syncer<S: RepositorySource> {
  inner: Arc<Inner<S>>,
}

struct Inner<S> {
  source: S,
  cache: Arc<RepositoryCache>,
  /// Refresh currently running; late triggers await this instead of fetching.
  in_flight: Mutex<Option<InFlight>>,
  status: Mutex<SyncStatus>,
}

impl<S: RepositorySource> Clone for Syncer<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: RepositorySource> Syncer<S> {
  pub fn new(source: S, cache: Arc<RepositoryCache>) -> Self {
    Self {
      inner: Arc::new(Inner {
        source,
        cache,
        in_flight: Mutex::new(None),
        status: Mutex::new(SyncStatus::default()),
      }),
    }
  }

  pub fn cache(&self) -> &RepositoryCache {
    &self.inner.cache
  }

  pub fn status(&self) -> SyncStatus {
    lock(&self.inner.status).clone()
  }

  /// Run a refresh, or join the one already running.
  ///
  /// Never fails: on any error the current snapshot comes back as
  /// [`RefreshOutcome::Stale`].
  pub async fn refresh(&self, trigger: Trigger) -> RefreshOutcome {
    let flight = {
      let mut slot = lock(&self.inner.in_flight);
      match slot.as_ref() {
        Some(flight) => {
          debug!(?trigger, "joining in-flight refresh");
          flight.clone()
        }
        None => {
          let inner = Arc::clone(&self.inner);
          let flight = async move { inner.run(trigger).await }.boxed().shared();
          *slot = Some(flight.clone());
          flight
        }
      }
    };

    flight.await
  }

  /// Refresh first when the cache is empty; otherwise do nothing.
  pub async fn ensure_populated(&self) {
    if self.inner.cache.is_empty() {
      debug!("cache empty, refreshing before read");
      self.refresh(Trigger::ColdRead).await;
    }
  }
}

impl<S: RepositorySource> Inner<S> {
  async fn run(self: Arc<Self>, trigger: Trigger) -> RefreshOutcome {
    {
      let mut status = lock(&self.status);
      status.state = SyncState::Refreshing;
      status.fetch_count += 1;
    }
    info!(?trigger, "refreshing repositories");

    let outcome = match self.fetch_and_replace().await {
      Ok(snapshot) => {
        info!(count = snapshot.len(), "repository cache replaced");
        let mut status = lock(&self.status);
        status.state = SyncState::Idle;
        status.last_success = Some(Local::now());
        RefreshOutcome::Fresh(snapshot)
      }
      Err(error) => {
        let snapshot = self.cache.snapshot();
        warn!(
          error = %error,
          kind = error.kind(),
          retained = snapshot.len(),
          "refresh failed, keeping last snapshot"
        );
        let mut status = lock(&self.status);
        status.state = SyncState::RefreshFailed {
          error: error.clone(),
          snapshot_retained: !snapshot.is_empty(),
        };
        status.last_failure = Some(Local::now());
        RefreshOutcome::Stale { snapshot, error }
      }
    };

    // Later triggers start a new refresh.
    *lock(&self.in_flight) = None;
    outcome
  }

  async fn fetch_and_replace(&self) -> Result<Snapshot, SyncError> {
    let records = self.source.fetch().await?;
    let repos: Vec<CachedRepository> = records.into_iter().map(RemoteRecord::normalize).collect();

    if repos.is_empty() {
      warn!("remote returned no repositories, clearing cache");
    }

    // SQLite write-through blocks; keep it off the async workers.
    let cache = Arc::clone(&self.cache);
    tokio::task::spawn_blocking(move || cache.replace_all(repos))
      .await
      .map_err(|e| SyncError::Storage(e.to_string()))?
      .map_err(|e| SyncError::Storage(e.to_string()))
  }
}

/// Poisoning only interrupts a plain field update, so the value is usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
