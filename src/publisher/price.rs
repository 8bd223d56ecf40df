//! Synthetic price source.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::session::SessionId;

/// A price with two fraction digits, stored as whole cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price {
    cents: u32,
}

impl Price {
    /// Exclusive upper bound, in cents (1000.00).
    pub const MAX_CENTS: u32 = 100_000;

    pub fn cents(&self) -> u32 {
        self.cents
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

/// Uniform random prices in `[0.00, 1000.00)`.
#[derive(Debug)]
pub struct PriceFeed {
    rng: StdRng,
}

impl PriceFeed {
    /// Feed seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic feed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_price(&mut self) -> Price {
        Price {
            cents: self.rng.random_range(0..Price::MAX_CENTS),
        }
    }
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the text frame clients receive for one update.
pub fn update_message(id: &SessionId, price: Price) -> String {
    format!("Stock Price Update for session {}: {}", id, price)
}
