//! Session registry: the concurrent map of live client connections.
//!
//! The map lock is only ever held for short, synchronous sections
//! (insert, detach, snapshot). Every transport call happens on a cloned
//! `Arc<Session>` after the lock has been released.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connection::{Connection, CLOSE_REASON, NORMAL_CLOSURE};
use super::{SessionId, SessionIdGenerator, SessionState};

/// Session lifetime used when `add` is not given an explicit timeout.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest lifetime a session can be given. Larger requests are clamped.
pub const MAX_SESSION_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `now + timeout`, clamped to [`MAX_SESSION_TIMEOUT`].
fn deadline(now: Instant, timeout: Duration) -> Instant {
    now + timeout.min(MAX_SESSION_TIMEOUT)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A registered client connection and its expiry deadline.
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Time when the session was registered.
    pub created_at: Instant,
    connection: Arc<dyn Connection>,
    expires_at: Mutex<Instant>,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(id: SessionId, connection: Arc<dyn Connection>, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            connection,
            expires_at: Mutex::new(deadline(now, timeout)),
            state: Mutex::new(SessionState::Open),
        }
    }

    /// Deadline after which the next sweep evicts this session.
    pub fn expires_at(&self) -> Instant {
        *lock(&self.expires_at)
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at() <= now
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Open in the registry's view and not closed by the peer.
    pub fn is_open(&self) -> bool {
        self.state().can_send() && self.connection.is_open()
    }

    fn extend(&self, timeout: Duration) {
        *lock(&self.expires_at) = deadline(Instant::now(), timeout);
    }

    /// Moves Open -> Closing. Only the first caller wins.
    fn begin_close(&self) -> bool {
        lock(&self.state).transition_to(SessionState::Closing).is_ok()
    }

    async fn close(&self) {
        if !self.begin_close() {
            return;
        }

        if self.connection.is_open() {
            if let Err(e) = self.connection.close(NORMAL_CLOSURE, CLOSE_REASON).await {
                debug!(session_id = %self.id, error = %e, "close frame not delivered");
            }
        } else {
            debug!(session_id = %self.id, "connection already closed by peer");
        }

        let _ = lock(&self.state).transition_to(SessionState::Closed);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}

/// Result of a single `send_to` call.
///
/// Anything other than `Delivered` means the session is gone for good as far
/// as the caller is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was written.
    Delivered,
    /// No session with that ID is registered.
    NotFound,
    /// The session exists but is closing or its peer has gone away.
    NotOpen,
    /// The transport failed; the session has been removed.
    Failed,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

/// Per-call delivery counts for `broadcast`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that were Open when the snapshot was taken.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Point-in-time view of a session, for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub age: Duration,
    /// Zero once the deadline has passed.
    pub expires_in: Duration,
}

/// Thread-safe registry of open sessions.
///
/// Constructed once at startup and shared as `Arc<SessionRegistry>`.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    ids: SessionIdGenerator,
    default_timeout: Duration,
}

impl SessionRegistry {
    /// Create an empty registry with the default 60 second session timeout.
    pub fn new() -> Self {
        Self::with_default_timeout(DEFAULT_SESSION_TIMEOUT)
    }

    /// Create an empty registry with a custom default session timeout.
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ids: SessionIdGenerator::new(),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection as a new session.
    ///
    /// The session expires `timeout` from now, or after the registry default
    /// when `None`. It is visible to every other operation as soon as this
    /// returns.
    pub fn add(&self, connection: Arc<dyn Connection>, timeout: Option<Duration>) -> SessionId {
        let id = self.ids.next_id();
        let timeout = timeout.unwrap_or(self.default_timeout);
        let session = Arc::new(Session::new(id, connection, timeout));

        let previous = self.write().insert(id, session);
        debug_assert!(previous.is_none(), "session id reused: {}", id);

        debug!(session_id = %id, timeout_secs = timeout.as_secs_f64(), "session added");
        id
    }

    /// Remove a session and close its connection.
    ///
    /// Returns `false` (and logs a warning) when the session is not
    /// registered. Calling this twice for the same ID closes the connection
    /// once.
    pub async fn remove(&self, id: &SessionId) -> bool {
        let detached = { self.write().remove(id) };

        match detached {
            Some(session) => {
                session.close().await;
                info!(session_id = %id, "session removed");
                true
            }
            None => {
                warn!(session_id = %id, "remove: session not found");
                false
            }
        }
    }

    /// Removal after a transport failure. A concurrent removal is not a miss.
    async fn evict(&self, id: &SessionId, cause: &'static str) {
        let detached = { self.write().remove(id) };

        if let Some(session) = detached {
            session.close().await;
            info!(session_id = %id, cause, "session evicted");
        }
    }

    /// Write a text frame to one session.
    ///
    /// Messages for unknown or non-Open sessions are dropped. A transport
    /// failure removes the session; the message is never retried.
    pub async fn send_to(&self, id: &SessionId, message: &str) -> SendOutcome {
        let Some(session) = self.get(id) else {
            warn!(session_id = %id, "send: session not found");
            return SendOutcome::NotFound;
        };

        if !session.is_open() {
            debug!(session_id = %id, state = ?session.state(), "send: session not open, dropping");
            return SendOutcome::NotOpen;
        }

        match session.connection.send_text(message).await {
            Ok(()) => SendOutcome::Delivered,
            Err(e) => {
                warn!(session_id = %id, error = %e, "send failed, removing session");
                self.evict(id, "send failure").await;
                SendOutcome::Failed
            }
        }
    }

    /// Send a text frame to every session that is Open right now.
    ///
    /// Sends run concurrently and the call waits for all of them. A failing
    /// recipient is logged and removed without affecting the others.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let targets: Vec<Arc<Session>> = {
            self.read()
                .values()
                .filter(|session| session.is_open())
                .cloned()
                .collect()
        };

        let results = join_all(targets.iter().map(|session| async move {
            (session.id, session.connection.send_text(message).await)
        }))
        .await;

        let mut report = BroadcastReport {
            attempted: targets.len(),
            ..BroadcastReport::default()
        };
        let mut failed = Vec::new();

        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "broadcast: send failed");
                    failed.push(id);
                }
            }
        }
        report.failed = failed.len();

        for id in &failed {
            self.evict(id, "broadcast failure").await;
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }

    /// Evict every session whose deadline has passed.
    ///
    /// All expired sessions found in this pass are removed, not just the
    /// first. Sessions removed or extended concurrently are skipped.
    /// Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();

        let candidates: Vec<SessionId> = {
            self.read()
                .values()
                .filter(|session| session.is_expired_at(now))
                .map(|session| session.id)
                .collect()
        };

        if candidates.is_empty() {
            debug!(sessions = self.len(), "sweep: nothing expired");
            return 0;
        }

        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.write();
            candidates
                .iter()
                .filter_map(|id| {
                    let still_expired = sessions
                        .get(id)
                        .is_some_and(|session| session.is_expired_at(now));
                    if still_expired {
                        sessions.remove(id)
                    } else {
                        None
                    }
                })
                .collect()
        };

        for session in &expired {
            info!(session_id = %session.id, "session expired");
        }
        join_all(expired.iter().map(|session| session.close())).await;

        info!(evicted = expired.len(), remaining = self.len(), "sweep complete");
        expired.len()
    }

    /// Push a session's deadline to `timeout` from now.
    ///
    /// Returns `false` if the session is not registered.
    pub fn extend(&self, id: &SessionId, timeout: Duration) -> bool {
        match self.get(id) {
            Some(session) => {
                session.extend(timeout);
                debug!(session_id = %id, timeout_secs = timeout.as_secs_f64(), "session extended");
                true
            }
            None => {
                warn!(session_id = %id, "extend: session not found");
                false
            }
        }
    }

    /// Remove every session, closing each connection. Used at shutdown.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = { self.write().drain().map(|(_, s)| s).collect() };

        join_all(drained.iter().map(|session| session.close())).await;

        if !drained.is_empty() {
            info!(closed = drained.len(), "closed all sessions");
        }
        drained.len()
    }

    /// Get a handle to the session with the given ID.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.read().contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// List all session IDs.
    pub fn ids(&self) -> Vec<SessionId> {
        self.read().keys().copied().collect()
    }

    /// Describe every registered session, ordered by ID.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let mut infos: Vec<SessionInfo> = self
            .read()
            .values()
            .map(|session| SessionInfo {
                id: session.id,
                state: session.state(),
                age: now.saturating_duration_since(session.created_at),
                expires_in: session.expires_at().saturating_duration_since(now),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
