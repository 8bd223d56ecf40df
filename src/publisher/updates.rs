//! Publisher loop for a single session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::price::{update_message, PriceFeed};
use crate::session::{SendOutcome, SessionId, SessionRegistry};

/// Default period between price updates.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(2);

/// Why a publisher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `send_to` did not deliver; carries what it reported instead.
    SessionGone(SendOutcome),
    /// The process-wide shutdown signal fired.
    Shutdown,
}

/// Pushes periodic price updates to one session at a time.
///
/// Cheap to clone; each spawned loop owns its own [`PriceFeed`].
#[derive(Clone)]
pub struct UpdatePublisher {
    registry: Arc<SessionRegistry>,
    interval: Duration,
}

impl UpdatePublisher {
    /// # Panics
    ///
    /// Loops started from this publisher panic if `interval` is zero.
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the update loop for `id` until delivery fails or shutdown.
    ///
    /// The first update goes out immediately.
    pub async fn run(
        &self,
        id: SessionId,
        mut feed: PriceFeed,
        mut shutdown: watch::Receiver<bool>,
    ) -> StopReason {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(session_id = %id, interval_ms = self.interval.as_millis() as u64, "publisher started");

        let reason = loop {
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break StopReason::Shutdown;
                    }
                }
                _ = ticker.tick() => {
                    let message = update_message(&id, feed.next_price());
                    let outcome = self.registry.send_to(&id, &message).await;
                    if !outcome.is_delivered() {
                        break StopReason::SessionGone(outcome);
                    }
                }
            }
        };

        info!(session_id = %id, reason = ?reason, "publisher stopped");
        reason
    }

    /// Run the loop on its own task with a fresh OS-seeded feed.
    pub fn spawn(&self, id: SessionId, shutdown: watch::Receiver<bool>) -> JoinHandle<StopReason> {
        let publisher = self.clone();
        tokio::spawn(async move { publisher.run(id, PriceFeed::new(), shutdown).await })
    }
}

/// Await a publisher task, containing any panic inside it.
///
/// Returns `None` if the task panicked or was cancelled; the failure is
/// logged and goes no further.
pub async fn supervise(id: SessionId, handle: JoinHandle<StopReason>) -> Option<StopReason> {
    match handle.await {
        Ok(reason) => Some(reason),
        Err(e) if e.is_panic() => {
            error!(session_id = %id, "publisher task panicked");
            None
        }
        Err(e) => {
            warn!(session_id = %id, error = %e, "publisher task cancelled");
            None
        }
    }
}
