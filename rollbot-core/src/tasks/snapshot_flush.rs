// rollbot-core/src/tasks/snapshot_flush.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::services::ScopeStateService;

/// Spawns a background task that periodically writes dirty scopes to the
/// store. When `shutdown` flips to `true` (or its sender is dropped) the task
/// does one last flush and exits.
pub fn spawn_snapshot_flush_task(
    service: Arc<ScopeStateService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let saved = service.flush().await;
                    if saved > 0 {
                        debug!("Flushed {} scopes", saved);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let saved = service.flush().await;
        info!("Snapshot flush task stopped after final flush ({} scopes)", saved);
    })
}
