//! Endpoint slot index.

use serde::{Deserialize, Serialize};

/// A small stable numeric index under which a bridged unit is exposed
/// downstream.
///
/// Slots are allocated once per upstream identity and survive restarts as
/// long as the persisted binding exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot(pub u16);

impl Slot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for Slot {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
