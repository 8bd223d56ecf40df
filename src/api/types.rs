//! API request and response types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::{BroadcastReport, SessionInfo, MAX_SESSION_TIMEOUT};

/// Query parameters accepted by the streaming endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StreamParams {
    /// Custom session lifetime in seconds; the server default applies when absent.
    /// Values beyond [`MAX_SESSION_TIMEOUT`] are clamped.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StreamParams {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .map(|secs| Duration::from_secs(secs).min(MAX_SESSION_TIMEOUT))
    }
}

/// Request to fan a message out to every open session.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    /// Text payload sent verbatim as a text frame.
    pub message: String,
}

/// Delivery counts for a broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResponse {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl From<BroadcastReport> for BroadcastResponse {
    fn from(report: BroadcastReport) -> Self {
        Self {
            attempted: report.attempted,
            delivered: report.delivered,
            failed: report.failed,
        }
    }
}

/// List sessions response.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// Total number of sessions.
    pub count: usize,
    /// Session summaries.
    pub sessions: Vec<SessionSummary>,
}

/// Brief session summary for listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Display form, e.g. `sess-0000002a`.
    pub session_id: String,
    pub state: String,
    pub age_seconds: f64,
    pub expires_in_seconds: f64,
}

impl From<SessionInfo> for SessionSummary {
    fn from(info: SessionInfo) -> Self {
        Self {
            session_id: info.id.to_string(),
            state: format!("{:?}", info.state),
            age_seconds: info.age.as_secs_f64(),
            expires_in_seconds: info.expires_in.as_secs_f64(),
        }
    }
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new("SESSION_NOT_FOUND", format!("Session '{}' not found", id))
    }

    pub fn upgrade_required() -> Self {
        Self::new("UPGRADE_REQUIRED", "Expected a WebSocket upgrade request")
    }
}
