//! GitHub webhook deliveries as a refresh trigger.
//!
//! Only repository lifecycle events and pushes can change what the mirror
//! holds; every other delivery is acknowledged and ignored.

use color_eyre::{eyre::eyre, Result};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info};

use super::{RefreshOutcome, RepositorySource, Syncer, Trigger};

type HmacSha256 = Hmac<Sha256>;

/// `repository` actions that change listed metadata.
const REFRESH_ACTIONS: &[&str] = &["created", "deleted", "publicized", "privatized", "edited"];

/// One inbound delivery.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
  /// Value of `X-GitHub-Event`
  pub category: String,
  /// Value of `X-GitHub-Delivery`, when sent
  pub delivery_id: Option<String>,
  pub payload: Value,
}

impl WebhookEvent {
  /// Parse a raw delivery body.
  pub fn from_body(category: &str, delivery_id: Option<String>, body: &[u8]) -> Result<Self> {
    let payload: Value =
      serde_json::from_slice(body).map_err(|e| eyre!("failed to parse webhook JSON: {}", e))?;

    Ok(Self {
      category: category.to_string(),
      delivery_id,
      payload,
    })
  }

  pub fn action(&self) -> Option<&str> {
    self.payload.get("action").and_then(Value::as_str)
  }
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
  Refreshed(RefreshOutcome),
  Ignored,
}

/// Whether a delivery of `category` with `action` warrants a refresh.
pub fn should_refresh(category: &str, action: Option<&str>) -> bool {
  match category {
    "repository" => action.is_some_and(|a| REFRESH_ACTIONS.contains(&a)),
    "push" => true,
    _ => false,
  }
}

/// Dispatch a delivery, refreshing the cache when it matters.
pub async fn handle_webhook<S: RepositorySource>(
  syncer: &Syncer<S>,
  event: &WebhookEvent,
) -> WebhookOutcome {
  let delivery = event.delivery_id.as_deref().unwrap_or("-");
  let action = event.action();
  info!(event = %event.category, delivery, action, "processing webhook event");

  if !should_refresh(&event.category, action) {
    debug!(event = %event.category, action, "ignoring webhook event");
    return WebhookOutcome::Ignored;
  }

  WebhookOutcome::Refreshed(syncer.refresh(Trigger::Webhook).await)
}

/// Verify an `X-Hub-Signature-256` value against the raw body.
pub fn verify_signature(secret: &str, signature: Option<&str>, body: &[u8]) -> Result<()> {
  let signature = signature.ok_or_else(|| eyre!("missing webhook signature"))?;

  let sig_hex = signature
    .strip_prefix("sha256=")
    .ok_or_else(|| eyre!("webhook signature does not start with sha256="))?;

  let sig_bytes = hex::decode(sig_hex).map_err(|e| eyre!("invalid hex in signature: {}", e))?;

  let mut mac =
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| eyre!("HMAC key error: {}", e))?;
  mac.update(body);

  mac
    .verify_slice(&sig_bytes)
    .map_err(|_| eyre!("webhook signature mismatch"))
}
