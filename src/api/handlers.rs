//! REST API handlers.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, warn};

use super::types::{
    BroadcastRequest, BroadcastResponse, ErrorResponse, ListSessionsResponse, SessionSummary,
};
use crate::publisher::{UpdatePublisher, DEFAULT_PUBLISH_INTERVAL};
use crate::session::{SessionId, SessionRegistry, DEFAULT_SESSION_TIMEOUT};

/// Default period between server keep-alive pings.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(120);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub publisher: UpdatePublisher,
    keep_alive: Option<Duration>,
    shutdown: Arc<watch::Sender<bool>>,
    connections: Arc<Mutex<JoinSet<()>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_SESSION_TIMEOUT, DEFAULT_PUBLISH_INTERVAL)
    }

    /// State with a custom default session timeout and publish interval.
    pub fn with_settings(session_timeout: Duration, publish_interval: Duration) -> Self {
        let registry = Arc::new(SessionRegistry::with_default_timeout(session_timeout));
        let publisher = UpdatePublisher::new(Arc::clone(&registry), publish_interval);
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            publisher,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
            shutdown: Arc::new(shutdown),
            connections: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Set the keep-alive ping period; `None` disables pings.
    pub fn with_keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }

    /// A receiver that observes the process-wide shutdown signal.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tell every publisher and the sweeper to stop.
    pub fn trigger_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn connections(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a per-connection task that shutdown will wait for.
    pub fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut connections = self.connections();
        // Reap completed connection tasks
        while let Some(result) = connections.try_join_next() {
            log_join_failure(result);
        }
        connections.spawn(task);
    }

    /// Number of tracked connection tasks that have not been reaped yet.
    pub fn tracked_connections(&self) -> usize {
        self.connections().len()
    }

    /// Wait for every tracked connection task to finish.
    ///
    /// Tasks tracked while draining are waited for too. Returns how many
    /// tasks were joined.
    pub async fn drain_connections(&self) -> usize {
        let mut joined = 0;
        loop {
            let mut inflight = std::mem::take(&mut *self.connections());
            if inflight.is_empty() {
                return joined;
            }
            while let Some(result) = inflight.join_next().await {
                log_join_failure(result);
                joined += 1;
            }
        }
    }

    /// Cancel every tracked connection task.
    pub fn abort_connections(&self) {
        self.connections().abort_all();
    }
}

fn log_join_failure(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("connection task panicked"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(error = %e, "connection task failed"),
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = if state.is_shutting_down() {
        "shutting_down"
    } else {
        "running"
    };
    Json(serde_json::json!({
        "name": "price-stream",
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "sessions": state.registry.len(),
    }))
}

/// List all sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    let sessions: Vec<SessionSummary> = state
        .registry
        .snapshot()
        .into_iter()
        .map(SessionSummary::from)
        .collect();

    Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

/// Remove a session, closing its connection.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::session_not_found(&session_id)),
        )
    };

    let id: SessionId = session_id.parse().map_err(|_| not_found())?;

    if state.registry.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

/// Send a text frame to every open session.
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let report = state.registry.broadcast(&req.message).await;
    Json(report.into())
}
