//! Slot status map.
//!
//! The single process-wide source of truth for which endpoint slots exist.
//! Persisted as one status character per slot (`f`/`u`/`c`); the string
//! length is the logical length. Slots are never physically removed, only
//! marked free, so indices stay stable for the lifetime of the store.

use serde::{Deserialize, Serialize};

/// Status of one slot within the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    /// Unoccupied; first candidate for a new allocation.
    Free,
    /// Occupied by an identity not (yet) seen again this session.
    Unconfirmed,
    /// Occupied and reconfirmed by a discovery pass this session.
    Confirmed,
}

impl SlotStatus {
    pub fn as_char(self) -> char {
        match self {
            Self::Free => 'f',
            Self::Unconfirmed => 'u',
            Self::Confirmed => 'c',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'f' => Some(Self::Free),
            'u' => Some(Self::Unconfirmed),
            'c' => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// The persisted value failed to decode.
#[derive(Debug, thiserror::Error)]
#[error("invalid slot status character '{0}'")]
pub struct SlotMapDecodeError(pub char);

/// Ordered slot statuses with a fixed capacity bound. Length only grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMap {
    statuses: Vec<SlotStatus>,
    capacity: usize,
}

impl SlotMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            statuses: Vec::new(),
            capacity,
        }
    }

    /// Decode a persisted map. A capacity smaller than the persisted length
    /// keeps all existing slots (they stay addressable) but blocks growth.
    pub fn decode(encoded: &str, capacity: usize) -> Result<Self, SlotMapDecodeError> {
        let statuses = encoded
            .chars()
            .map(|c| SlotStatus::from_char(c).ok_or(SlotMapDecodeError(c)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { statuses, capacity })
    }

    pub fn encode(&self) -> String {
        self.statuses.iter().map(|s| s.as_char()).collect()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn status(&self, index: usize) -> Option<SlotStatus> {
        self.statuses.get(index).copied()
    }

    /// Start a new session: nothing is confirmed until a discovery pass says
    /// so, so every confirmed slot drops back to unconfirmed.
    pub fn begin_session(&mut self) {
        for status in &mut self.statuses {
            if *status == SlotStatus::Confirmed {
                *status = SlotStatus::Unconfirmed;
            }
        }
    }

    /// Leftmost free slot, if any.
    pub fn first_free(&self) -> Option<usize> {
        self.statuses.iter().position(|s| *s == SlotStatus::Free)
    }

    pub fn set(&mut self, index: usize, status: SlotStatus) {
        if let Some(slot) = self.statuses.get_mut(index) {
            *slot = status;
        }
    }

    /// Append a new slot, unless the capacity bound is reached.
    pub fn append(&mut self, status: SlotStatus) -> Option<usize> {
        if self.statuses.len() >= self.capacity {
            return None;
        }
        self.statuses.push(status);
        Some(self.statuses.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        for encoded in ["", "c", "ccfu", "fffff", "ufcufc"] {
            let map = SlotMap::decode(encoded, 16).unwrap();
            assert_eq!(map.encode(), encoded);
            assert_eq!(map.len(), encoded.len());
        }
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        assert!(SlotMap::decode("ccx", 16).is_err());
    }

    #[test]
    fn test_begin_session_downgrades_confirmed() {
        let mut map = SlotMap::decode("cfcu", 16).unwrap();
        map.begin_session();
        assert_eq!(map.encode(), "ufuu");
    }

    #[test]
    fn test_first_free_prefers_leftmost_gap() {
        let map = SlotMap::decode("ccfc", 16).unwrap();
        assert_eq!(map.first_free(), Some(2));

        let map = SlotMap::decode("cccc", 16).unwrap();
        assert_eq!(map.first_free(), None);
    }

    #[test]
    fn test_append_respects_capacity() {
        let mut map = SlotMap::new(2);
        assert_eq!(map.append(SlotStatus::Confirmed), Some(0));
        assert_eq!(map.append(SlotStatus::Confirmed), Some(1));
        assert_eq!(map.append(SlotStatus::Confirmed), None);
        assert_eq!(map.len(), 2);
    }
}
