mod cache;
mod config;
mod error;
mod github;
mod logging;
mod service;
mod sync;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use crate::cache::{RepositoryCache, SqliteStorage};
use crate::github::{CachedRepository, GitHubClient};
use crate::service::{RepoFilter, RepositoryService, Visibility};
use crate::sync::{RefreshOutcome, SyncState, Syncer, WebhookEvent, WebhookOutcome};

#[derive(Parser, Debug)]
#[command(name = "repo-mirror")]
#[command(about = "Mirror your GitHub repositories into a local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/repo-mirror/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// GitHub API base URL
  #[arg(long, global = true)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List cached repositories, refreshing first if the cache is empty
  List {
    /// Case-insensitive match on name or description
    #[arg(short, long)]
    search: Option<String>,
    /// Exact language name (ignored when --search is given)
    #[arg(short, long)]
    language: Option<String>,
    /// Only private repositories
    #[arg(long, conflicts_with = "public")]
    private: bool,
    /// Only public repositories
    #[arg(long)]
    public: bool,
    /// Only forks
    #[arg(long, conflicts_with = "sources")]
    forks: bool,
    /// Only non-forks
    #[arg(long)]
    sources: bool,
    #[arg(long)]
    json: bool,
  },
  /// Fetch from GitHub now and replace the cache
  Refresh {
    #[arg(long)]
    json: bool,
  },
  /// Languages present in the cache
  Languages,
  /// Aggregate counts over the cache
  Stats {
    #[arg(long)]
    json: bool,
  },
  /// Process one webhook delivery
  Webhook {
    /// X-GitHub-Event value
    #[arg(short, long)]
    event: String,
    /// X-GitHub-Delivery value
    #[arg(short, long)]
    delivery: Option<String>,
    /// X-Hub-Signature-256 value; required when a webhook secret is set
    #[arg(long)]
    signature: Option<String>,
    /// Payload file (default: stdin)
    #[arg(short, long)]
    payload: Option<PathBuf>,
  },
  /// Refresh on the configured interval until interrupted
  Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(api_url) = args.api_url {
    config.github.api_url = api_url;
  }

  let _log_guard = logging::init(&config.logging)?;
  info!(version = env!("CARGO_PKG_VERSION"), "repo-mirror starting");

  let cache = if config.cache.persist {
    let path = config.cache_path()?;
    info!(path = %path.display(), "opening cache database");
    RepositoryCache::open(SqliteStorage::open(&path)?)?
  } else {
    RepositoryCache::in_memory()
  };
  info!(repositories = cache.len(), "cache loaded");

  let client = GitHubClient::new(&config)?;
  info!(endpoint = %client.endpoint(), "GitHub client ready");

  let syncer = Syncer::new(client, Arc::new(cache));
  let service = RepositoryService::new(syncer);

  match args.command {
    Command::List {
      search,
      language,
      private,
      public,
      forks,
      sources,
      json,
    } => {
      let filter = RepoFilter {
        search,
        language,
        visibility: match (private, public) {
          (true, _) => Some(Visibility::Private),
          (_, true) => Some(Visibility::Public),
          _ => None,
        },
        fork: match (forks, sources) {
          (true, _) => Some(true),
          (_, true) => Some(false),
          _ => None,
        },
      };
      let repos = service.list_repositories(&filter).await;
      print_repositories(&repos, json)?;
    }
    Command::Refresh { json } => {
      let outcome = service.force_refresh().await;
      report_refresh(&outcome);
      print_repositories(outcome.repositories(), json)?;
    }
    Command::Languages => {
      for language in service.list_languages() {
        println!("{language}");
      }
    }
    Command::Stats { json } => {
      let stats = service.compute_stats().await;
      if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
      } else {
        println!("Repositories: {}", stats.total_repositories);
        println!("  public:     {}", stats.public_repositories);
        println!("  private:    {}", stats.private_repositories);
        println!("  forks:      {}", stats.forked_repositories);
        println!("Stars:        {}", stats.total_stars);
        println!("Forks:        {}", stats.total_forks);
      }
    }
    Command::Webhook {
      event,
      delivery,
      signature,
      payload,
    } => {
      let body = read_payload(payload.as_deref())?;

      if let Some(secret) = config::Config::get_webhook_secret() {
        sync::verify_signature(&secret, signature.as_deref(), &body)?;
      }

      let event = WebhookEvent::from_body(&event, delivery, &body)?;
      match sync::handle_webhook(service.syncer(), &event).await {
        WebhookOutcome::Refreshed(outcome) => {
          report_refresh(&outcome);
          println!("refreshed: {} repositories", outcome.repositories().len());
        }
        WebhookOutcome::Ignored => println!("ignored: {}", event.category),
      }
    }
    Command::Watch => {
      let timer = sync::spawn_refresh_timer(service.syncer().clone(), config.sync.interval());
      tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
      timer.abort();

      let status = service.status();
      if let SyncState::RefreshFailed { error, .. } = &status.state {
        warn!(error = %error, "last refresh before shutdown failed");
      }
      info!(
        fetches = status.fetch_count,
        last_success = ?status.last_success,
        "shutting down"
      );
    }
  }

  Ok(())
}

fn report_refresh(outcome: &RefreshOutcome) {
  if let Some(error) = outcome.error() {
    warn!(error = %error, "refresh failed, showing cached data");
    eprintln!("warning: refresh failed ({error}); showing cached data");
  }
}

fn read_payload(path: Option<&Path>) -> Result<Vec<u8>> {
  match path {
    Some(p) => {
      std::fs::read(p).map_err(|e| eyre!("Failed to read payload {}: {}", p.display(), e))
    }
    None => {
      let mut body = Vec::new();
      std::io::stdin()
        .read_to_end(&mut body)
        .map_err(|e| eyre!("Failed to read payload from stdin: {}", e))?;
      Ok(body)
    }
  }
}

fn print_repositories(repos: &[CachedRepository], json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(repos)?);
    return Ok(());
  }

  for repo in repos {
    let mut flags = Vec::new();
    if repo.is_private {
      flags.push("private");
    }
    if repo.is_fork {
      flags.push("fork");
    }
    println!(
      "{:<40} {:<12} ★{:<6} ⑂{:<5} {}",
      repo.full_name,
      repo.language,
      repo.stargazers_count,
      repo.forks_count,
      flags.join(",")
    );
  }
  Ok(())
}
