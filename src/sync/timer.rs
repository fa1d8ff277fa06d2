use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{RepositorySource, Syncer, Trigger};

/// Refresh every `period`, starting immediately, until the handle is aborted.
///
/// A slow refresh delays the following tick instead of bunching ticks up.
pub fn spawn_refresh_timer<S: RepositorySource>(syncer: Syncer<S>, period: Duration) -> JoinHandle<()> {
  info!(period_secs = period.as_secs(), "starting refresh timer");

  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      ticker.tick().await;
      let outcome = syncer.refresh(Trigger::Timer).await;
      debug!(
        fresh = outcome.is_fresh(),
        count = outcome.repositories().len(),
        "timer refresh finished"
      );
    }
  })
}
