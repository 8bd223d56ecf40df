//! WebSocket endpoint streaming price updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::handlers::AppState;
use super::types::{ErrorResponse, StreamParams};
use crate::error::PriceStreamError;
use crate::publisher::{supervise, StopReason};
use crate::session::{Connection, SendOutcome, SessionId};
use crate::Result;

/// How long to wait for the peer's close reply after we close.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Write half of an accepted WebSocket, exposed to the registry.
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }

    /// Record that the peer closed or the read half failed.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Send a keep-alive ping. A failed write marks the connection closed.
    pub async fn ping(&self) -> Result<()> {
        if !self.is_open() {
            return Err(PriceStreamError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Ping(Bytes::new())).await.map_err(|e| {
            self.mark_closed();
            PriceStreamError::Transport(e.to_string())
        })
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(PriceStreamError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| {
                self.mark_closed();
                PriceStreamError::Transport(e.to_string())
            })
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        let mut sink = self.sink.lock().await;
        sink.send(Message::Close(Some(frame)))
            .await
            .map_err(|e| PriceStreamError::Transport(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// WebSocket upgrade handler.
///
/// Plain HTTP requests get `400 Bad Request`.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(reason = %rejection, "rejecting non-WebSocket request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::upgrade_required().with_details(rejection.to_string())),
            )
                .into_response();
        }
    };

    let timeout = params.timeout();
    ws.on_upgrade(move |socket| async move {
        let tracker = state.clone();
        tracker.track(handle_socket(socket, state, timeout));
    })
}

/// Drive one accepted connection from registration to close.
async fn handle_socket(socket: WebSocket, state: AppState, timeout: Option<Duration>) {
    let (sink, stream) = socket.split();
    let connection = Arc::new(WsConnection::new(sink));

    let id = state.registry.add(connection.clone(), timeout);
    info!(session_id = %id, "new WebSocket connection established");

    let mut reader = tokio::spawn(drain_incoming(id, stream, Arc::clone(&connection)));

    let pinger = state.keep_alive().filter(|period| !period.is_zero()).map(|period| {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(keep_alive(id, Arc::clone(&connection), period, stopped));
        (stop, handle)
    });

    let publisher = state.publisher.spawn(id, state.shutdown_receiver());
    let reason = supervise(id, publisher).await;

    if let Some((stop, handle)) = pinger {
        let _ = stop.send(());
        let _ = handle.await;
    }

    if should_remove(reason, state.registry.contains(&id)) {
        state.registry.remove(&id).await;
    }

    if tokio::time::timeout(CLOSE_GRACE, &mut reader).await.is_err() {
        debug!(session_id = %id, "peer did not finish close handshake");
        reader.abort();
    }
}

/// Whether the connection task still has to remove its own session.
///
/// `NotFound` and `Failed` mean the registry already let go of it; at
/// shutdown the session may have been closed by `close_all` already.
fn should_remove(reason: Option<StopReason>, registered: bool) -> bool {
    match reason {
        Some(StopReason::SessionGone(SendOutcome::NotFound | SendOutcome::Failed)) => false,
        Some(StopReason::Shutdown) => registered,
        _ => true,
    }
}

/// Ping the peer every `period` until told to stop or a ping fails.
async fn keep_alive(
    id: SessionId,
    connection: Arc<WsConnection>,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {
                if let Err(e) = connection.ping().await {
                    debug!(session_id = %id, error = %e, "keep-alive ping failed");
                    break;
                }
            }
        }
    }
}

/// Consume inbound frames until the peer closes or the socket errors.
///
/// Clients never send anything meaningful; reading keeps pings answered and
/// lets us notice a disconnect before the next publish tick.
async fn drain_incoming(
    id: SessionId,
    mut stream: SplitStream<WebSocket>,
    connection: Arc<WsConnection>,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Close(frame)) => {
                debug!(session_id = %id, frame = ?frame, "peer closed connection");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!(session_id = %id, len = text.len(), "ignoring client text frame");
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(session_id = %id, error = %e, "read failed");
                break;
            }
        }
    }

    connection.mark_closed();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_remove_after_peer_close() {
        let reason = Some(StopReason::SessionGone(SendOutcome::NotOpen));
        assert!(should_remove(reason, true));
    }

    #[test]
    fn test_should_not_remove_when_registry_let_go() {
        for outcome in [SendOutcome::NotFound, SendOutcome::Failed] {
            assert!(!should_remove(Some(StopReason::SessionGone(outcome)), false));
        }
    }

    #[test]
    fn test_shutdown_skips_sessions_already_closed() {
        assert!(should_remove(Some(StopReason::Shutdown), true));
        assert!(!should_remove(Some(StopReason::Shutdown), false));
    }

    #[test]
    fn test_should_remove_after_publisher_panic() {
        assert!(should_remove(None, true));
    }
}
