//! Background expiration sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::SessionRegistry;

/// Default period between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the periodic sweep loop.
///
/// The first sweep runs immediately, then once per `period`. The task exits
/// when `shutdown` flips to `true` or its sender is dropped; the returned
/// handle should be awaited during graceful shutdown.
///
/// # Panics
///
/// Panics if `period` is zero.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs_f64(), "session sweeper started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let evicted = registry.sweep().await;
                    debug!(evicted, "sweep tick");
                }
            }
        }

        info!("session sweeper stopped");
    })
}
