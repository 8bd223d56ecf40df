//! # price-stream
//!
//! WebSocket fan-out server that streams periodic price updates.
//!
//! Every accepted WebSocket connection becomes a session in a shared
//! [`SessionRegistry`]. A per-session publisher pushes a synthetic price
//! update on a fixed interval, and a background sweeper evicts sessions
//! whose lifetime has run out, sending each one a normal close frame.
//!
//! ## Features
//!
//! - **Session registry**: concurrent add, remove, targeted send, broadcast
//!   and expiration sweep
//! - **Price publisher**: one update stream per session that stops as soon
//!   as its session is gone
//! - **REST introspection**: list, remove and broadcast over HTTP
//! - **Graceful shutdown**: open sessions are closed on Ctrl+C or SIGTERM
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use price_stream::{MemoryConnection, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SessionRegistry::new();
//!
//!     let conn = Arc::new(MemoryConnection::new());
//!     let id = registry.add(conn.clone(), None);
//!
//!     registry.send_to(&id, "hello").await;
//!     registry.remove(&id).await;
//!
//!     assert_eq!(conn.texts(), vec!["hello"]);
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod session;

// Re-export commonly used types
pub use error::{PriceStreamError, Result};
pub use publisher::{Price, PriceFeed, StopReason, UpdatePublisher};
pub use session::{
    BroadcastReport, Connection, MemoryConnection, SendOutcome, Session, SessionId,
    SessionRegistry, SessionState,
};
