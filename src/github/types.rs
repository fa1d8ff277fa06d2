use chrono::NaiveDateTime;
use serde::Serialize;

/// Language recorded for repositories the remote reports without one.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// A repository as held in the local cache, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRepository {
  pub id: u64,
  pub name: String,
  pub full_name: String,
  pub description: Option<String>,
  pub html_url: String,
  pub stargazers_count: u64,
  pub forks_count: u64,
  pub language: String,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
  pub is_private: bool,
  pub is_fork: bool,
}

impl CachedRepository {
  /// Case-insensitive substring match against name or description.
  /// `needle` must already be lowercased.
  pub fn matches_search(&self, needle: &str) -> bool {
    self.name.to_lowercase().contains(needle)
      || self
        .description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains(needle))
  }
}
