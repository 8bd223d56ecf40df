//! Transport seam between the registry and a live client connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PriceStreamError;
use crate::Result;

/// WebSocket status code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reason sent with the close frame when a session is removed.
pub const CLOSE_REASON: &str = "Connection closed";

/// An open, message-framed, bidirectional client connection.
///
/// Implementations may lock internally around writes; callers never hold
/// registry locks while awaiting these methods.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write a single UTF-8 text frame.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Send a close frame and shut down the write half.
    ///
    /// Must be idempotent: closing an already-closed connection is `Ok(())`
    /// and emits nothing.
    async fn close(&self, code: u16, reason: &str) -> Result<()>;

    /// Whether the transport still considers itself open.
    fn is_open(&self) -> bool;
}

/// A frame captured by [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

/// In-memory connection that records every frame written to it.
///
/// Used for embedding the registry without a network transport and for
/// exercising failure paths: sends can be made to fail, and the peer can be
/// "disconnected" without a close frame.
#[derive(Debug)]
pub struct MemoryConnection {
    frames: Mutex<Vec<Frame>>,
    open: AtomicBool,
    fail_sends: AtomicBool,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// A connection whose every send fails with a transport error.
    pub fn failing() -> Self {
        let conn = Self::new();
        conn.set_fail_sends(true);
        conn
    }

    /// Toggle simulated transport failures.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulate the peer dropping the connection.
    pub fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// All frames written so far.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Payloads of the text frames written so far.
    pub fn texts(&self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                Frame::Close { .. } => None,
            })
            .collect()
    }

    /// Number of close frames written.
    pub fn close_count(&self) -> usize {
        self.frames()
            .iter()
            .filter(|frame| matches!(frame, Frame::Close { .. }))
            .count()
    }

    fn push(&self, frame: Frame) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame);
        }
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send_text(&self, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            self.open.store(false, Ordering::SeqCst);
            return Err(PriceStreamError::Transport("simulated send failure".into()));
        }
        if !self.is_open() {
            return Err(PriceStreamError::ConnectionClosed);
        }
        self.push(Frame::Text(text.to_string()));
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.push(Frame::Close {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_text_frames() {
        let conn = MemoryConnection::new();
        conn.send_text("hello").await.unwrap();
        conn.send_text("world").await.unwrap();
        assert_eq!(conn.texts(), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = MemoryConnection::new();
        conn.close(NORMAL_CLOSURE, CLOSE_REASON).await.unwrap();
        conn.close(NORMAL_CLOSURE, CLOSE_REASON).await.unwrap();

        assert!(!conn.is_open());
        assert_eq!(
            conn.frames(),
            vec![Frame::Close {
                code: 1000,
                reason: "Connection closed".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_failing_send() {
        let conn = MemoryConnection::failing();
        let err = conn.send_text("x").await.unwrap_err();
        assert!(matches!(err, PriceStreamError::Transport(_)));
        assert!(conn.texts().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_disconnect() {
        let conn = MemoryConnection::new();
        conn.disconnect();
        let err = conn.send_text("x").await.unwrap_err();
        assert!(matches!(err, PriceStreamError::ConnectionClosed));

        // Peer is already gone: no close frame goes out.
        conn.close(NORMAL_CLOSURE, CLOSE_REASON).await.unwrap();
        assert_eq!(conn.close_count(), 0);
    }
}
