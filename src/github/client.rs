use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::SyncError;
use crate::github::api_types::{decode_page, RemoteRecord};
use crate::sync::RepositorySource;

/// Items requested per page; only the first page is fetched.
pub const PAGE_SIZE: u32 = 100;

/// Longest response body kept in an `Api` error.
const ERROR_BODY_LIMIT: usize = 200;

/// GitHub API client for the authenticated user's repositories
#[derive(Clone)]
pub struct GitHubClient {
  http: reqwest::Client,
  endpoint: Url,
}

impl GitHubClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
      .map_err(|e| eyre!("GitHub token is not a valid header value: {}", e))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let mut builder = reqwest::Client::builder()
      .default_headers(headers)
      .user_agent(config.github.user_agent.clone());
    if let Some(secs) = config.github.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }

    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      endpoint: repos_endpoint(&config.github.api_url)?,
    })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

impl RepositorySource for GitHubClient {
  /// List the first page of the user's repositories, most recently updated first
  async fn fetch(&self) -> Result<Vec<RemoteRecord>, SyncError> {
    debug!(url = %self.endpoint, "requesting repository listing");

    let resp = self.http.get(self.endpoint.clone()).send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    check_status(status, &body)?;

    let records = decode_page(&body)?;
    debug!(count = records.len(), "received repository listing");
    Ok(records)
  }
}

/// `<base>/user/repos?type=all&sort=updated&per_page=100`
fn repos_endpoint(api_url: &str) -> Result<Url> {
  let base = format!("{}/user/repos", api_url.trim_end_matches('/'));
  let mut url =
    Url::parse(&base).map_err(|e| eyre!("Invalid GitHub API URL {}: {}", api_url, e))?;

  url
    .query_pairs_mut()
    .append_pair("type", "all")
    .append_pair("sort", "updated")
    .append_pair("per_page", &PAGE_SIZE.to_string());

  Ok(url)
}

fn check_status(status: StatusCode, body: &str) -> Result<(), SyncError> {
  if status.is_success() {
    return Ok(());
  }

  warn!(%status, "GitHub returned non-success for repository listing");

  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth {
      status: status.as_u16(),
    }),
    _ => Err(SyncError::Api {
      status: status.as_u16(),
      body: body.chars().take(ERROR_BODY_LIMIT).collect(),
    }),
  }
}
