//! Per-session price update stream.
//!
//! A publisher ticks on a fixed interval, renders one synthetic price update
//! and hands it to [`SessionRegistry::send_to`](crate::session::SessionRegistry::send_to).
//! It stops for good the first time delivery is not confirmed.

mod price;
mod updates;

pub use price::{update_message, Price, PriceFeed};
pub use updates::{supervise, StopReason, UpdatePublisher, DEFAULT_PUBLISH_INTERVAL};
