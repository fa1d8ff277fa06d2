//! Serde-deserializable types matching the GitHub repository listing.
//!
//! These types are separate from the cached domain type so that every
//! nullable field the API may send stays nullable until normalization.

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use tracing::warn;

use crate::error::SyncError;

use super::types::{CachedRepository, UNKNOWN_LANGUAGE};

/// Zone-less ISO-8601 date-time forms, tried in order. Seconds and
/// fractional seconds are optional.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

// ============================================================================
// Repository listing item
// ============================================================================

/// One item of `GET /user/repos`, consumed once by [`RemoteRecord::normalize`].
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRecord {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub full_name: String,
  pub description: Option<String>,
  #[serde(default)]
  pub html_url: String,
  pub stargazers_count: Option<u64>,
  pub forks_count: Option<u64>,
  pub language: Option<String>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
  pub private: Option<bool>,
  pub fork: Option<bool>,
}

/// Decode a listing page.
///
/// The body must be a JSON array. Items that do not fit [`RemoteRecord`] are
/// skipped and logged so one bad item never sinks the page. A non-empty page
/// with no usable item is a decode failure, not an empty account.
pub fn decode_page(body: &str) -> Result<Vec<RemoteRecord>, SyncError> {
  let items: Vec<serde_json::Value> = serde_json::from_str(body)?;
  let total = items.len();

  let mut records = Vec::with_capacity(total);
  for (index, item) in items.into_iter().enumerate() {
    match serde_json::from_value::<RemoteRecord>(item) {
      Ok(record) => records.push(record),
      Err(e) => warn!(index, error = %e, "skipping malformed repository item"),
    }
  }

  if total > 0 && records.is_empty() {
    return Err(SyncError::Decode(format!(
      "all {total} repository items were malformed"
    )));
  }

  Ok(records)
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl RemoteRecord {
  pub fn normalize(self) -> CachedRepository {
    let created_at = parse_timestamp(&self.name, self.created_at.as_deref());
    let updated_at = parse_timestamp(&self.name, self.updated_at.as_deref());

    CachedRepository {
      id: self.id,
      name: self.name,
      full_name: self.full_name,
      description: self.description,
      html_url: self.html_url,
      stargazers_count: self.stargazers_count.unwrap_or(0),
      forks_count: self.forks_count.unwrap_or(0),
      language: self
        .language
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
      created_at,
      updated_at,
      is_private: self.private.unwrap_or(false),
      is_fork: self.fork.unwrap_or(false),
    }
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse an API timestamp as a local date-time, dropping the trailing `Z`.
///
/// Missing or unparseable values become the current wall-clock time.
fn parse_timestamp(repo: &str, raw: Option<&str>) -> NaiveDateTime {
  let Some(raw) = raw else {
    return Local::now().naive_local();
  };

  let trimmed = raw.strip_suffix('Z').unwrap_or(raw);
  let parsed = TIMESTAMP_FORMATS
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok());

  parsed.unwrap_or_else(|| {
    warn!(repo, value = raw, "unparseable timestamp, using now");
    Local::now().naive_local()
  })
}
