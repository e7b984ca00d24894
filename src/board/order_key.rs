//! Sparse integer order keys
//!
//! Keys are spaced [`KEY_GAP`] apart so an insertion or move between two
//! neighbours takes the midpoint and leaves every other key alone. Once two
//! neighbours are adjacent integers there is no midpoint left and the board
//! compacts: every key is reassigned to `(i + 1) * KEY_GAP`.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const KEY_GAP: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(u64);

impl OrderKey {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Evenly spaced key for the `index`-th item of a compacted board
    pub fn spaced(index: usize) -> Self {
        Self((index as u64 + 1).saturating_mul(KEY_GAP))
    }

    /// A key strictly between `lower` and `upper` (open ends allowed), or
    /// `None` when no integer fits
    pub fn between(lower: Option<OrderKey>, upper: Option<OrderKey>) -> Option<OrderKey> {
        let low = lower.map_or(0, |k| k.0);
        match upper {
            Some(OrderKey(high)) => {
                if high <= low || high - low < 2 {
                    None
                } else {
                    Some(Self(low + (high - low) / 2))
                }
            }
            None => low.checked_add(KEY_GAP).map(Self),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
