//! API layer for price-stream.
//!
//! This module provides the WebSocket price stream plus a small REST
//! surface for inspecting and driving the session registry.
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/v1/` - API information and live session count
//!
//! ### Sessions
//! - `GET /api/v1/sessions` - List all sessions
//! - `DELETE /api/v1/sessions/{id}` - Remove a session (sends a close frame)
//! - `POST /api/v1/broadcast` - Send a text frame to every open session
//!
//! ### Streaming
//! - `WS /ws[?timeout_secs=N]` - Periodic price updates for a new session
//!
//! ## Example
//!
//! ```no_run
//! use price_stream::api::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> price_stream::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 3000);
//!     serve(config).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use handlers::AppState;
pub use router::{
    create_router, create_router_with_state, run, serve, serve_with_state, shutdown_signal,
    ServerConfig,
};
pub use types::{
    BroadcastRequest, BroadcastResponse, ErrorResponse, ListSessionsResponse, SessionSummary,
    StreamParams,
};
pub use websocket::WsConnection;
