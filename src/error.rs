//! Failure taxonomy for the refresh path.
//!
//! None of these reach a reader of the cache: the orchestrator turns every
//! variant into "keep the last snapshot". They are kept typed so the sync
//! status and tests can tell the failures apart.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
  /// Network failure or timeout talking to the remote API.
  #[error("transport error: {0}")]
  Transport(String),

  /// The remote rejected the credential (401/403).
  #[error("credential rejected by remote (HTTP {status})")]
  Auth { status: u16 },

  /// Any other non-success status.
  #[error("remote returned HTTP {status}: {body}")]
  Api { status: u16, body: String },

  /// The response body could not be decoded.
  #[error("failed to decode remote response: {0}")]
  Decode(String),

  /// Persisting the new snapshot failed; nothing was swapped in.
  #[error("failed to persist snapshot: {0}")]
  Storage(String),
}

impl SyncError {
  /// Short label used in log fields.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Transport(_) => "transport",
      Self::Auth { .. } => "auth",
      Self::Api { .. } => "api",
      Self::Decode(_) => "decode",
      Self::Storage(_) => "storage",
    }
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      Self::Decode(e.to_string())
    } else {
      Self::Transport(e.to_string())
    }
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}
