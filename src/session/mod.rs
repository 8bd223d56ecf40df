//! Session management module.
//!
//! This module owns the registry of live client connections: session
//! identification, lifecycle state, the transport seam, and the periodic
//! expiration sweep.

mod connection;
mod id;
mod registry;
mod state;
mod sweeper;

pub use connection::{Connection, Frame, MemoryConnection, CLOSE_REASON, NORMAL_CLOSURE};
pub use id::{SessionId, SessionIdGenerator};
pub use registry::{
    BroadcastReport, SendOutcome, Session, SessionInfo, SessionRegistry, DEFAULT_SESSION_TIMEOUT,
    MAX_SESSION_TIMEOUT,
};
pub use state::SessionState;
pub use sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
