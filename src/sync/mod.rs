//! Keeps the repository cache in step with the remote.
//!
//! Three triggers drive refreshes: a cold read of an empty cache, the
//! periodic timer, and inbound webhook deliveries. They all funnel through
//! [`Syncer::refresh`], which allows at most one fetch-and-replace at a time.

mod orchestrator;
mod timer;
mod webhook;

use std::future::Future;

use crate::error::SyncError;
use crate::github::RemoteRecord;

pub use orchestrator::{RefreshOutcome, SyncState, SyncStatus, Syncer, Trigger};
pub use timer::spawn_refresh_timer;
pub use webhook::{handle_webhook, verify_signature, WebhookEvent, WebhookOutcome};

/// Where refreshes read repositories from.
pub trait RepositorySource: Send + Sync + 'static {
  fn fetch(&self) -> impl Future<Output = Result<Vec<RemoteRecord>, SyncError>> + Send;
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted remote and record builders shared by the unit tests.

  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  use super::RepositorySource;
  use crate::error::SyncError;
  use crate::github::{CachedRepository, RemoteRecord};

  pub fn record(id: u64, name: &str, language: Option<&str>) -> RemoteRecord {
    RemoteRecord {
      id,
      name: name.to_string(),
      full_name: format!("octo/{name}"),
      description: None,
      html_url: format!("https://github.com/octo/{name}"),
      stargazers_count: Some(id),
      forks_count: Some(0),
      language: language.map(String::from),
      created_at: Some("2022-03-04T05:06:07Z".to_string()),
      updated_at: Some("2024-06-07T08:09:10Z".to_string()),
      private: Some(false),
      fork: Some(false),
    }
  }

  pub fn repo(id: u64, name: &str, language: &str) -> CachedRepository {
    record(id, name, Some(language)).normalize()
  }

  type Response = Result<Vec<RemoteRecord>, SyncError>;

  /// Remote that replays scripted responses; the last one repeats forever.
  pub struct FakeSource {
    responses: Mutex<VecDeque<Response>>,
    last: Mutex<Response>,
    delay: Duration,
    fetches: Arc<AtomicUsize>,
  }

  impl FakeSource {
    pub fn new(first: Response) -> Self {
      Self {
        responses: Mutex::new(VecDeque::new()),
        last: Mutex::new(first),
        delay: Duration::ZERO,
        fetches: Arc::new(AtomicUsize::new(0)),
      }
    }

    pub fn returning(records: Vec<RemoteRecord>) -> Self {
      Self::new(Ok(records))
    }

    pub fn failing(error: SyncError) -> Self {
      Self::new(Err(error))
    }

    /// Queue `next` to be served after everything scripted so far.
    pub fn then(self, next: Response) -> Self {
      {
        let mut responses = self.responses.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        let previous = std::mem::replace(&mut *last, next);
        responses.push_back(previous);
      }
      self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
    }

    /// Handle that keeps counting after the source is moved into a syncer.
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
      Arc::clone(&self.fetches)
    }
  }

  impl RepositorySource for FakeSource {
    async fn fetch(&self) -> Response {
      self.fetches.fetch_add(1, Ordering::SeqCst);
      let response = match self.responses.lock().unwrap().pop_front() {
        Some(response) => response,
        None => self.last.lock().unwrap().clone(),
      };
      if !self.delay.is_zero() {
        tokio::time::sleep(self.delay).await;
      }
      response
    }
  }
}
