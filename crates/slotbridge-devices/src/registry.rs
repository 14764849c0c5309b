//! Endpoint identity registry.
//!
//! Assigns each upstream identity a small stable slot and keeps the
//! assignment consistent with the persisted store across restarts. An
//! identity that ever got a slot keeps it for as long as its binding record
//! exists; new identities take the leftmost free gap before the map grows.
//!
//! Persistence failures are logged and the registry continues on its
//! in-memory state; a binding write always happens before the slot is
//! returned to the caller, so a consumer can never observe an unpersisted
//! allocation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use slotbridge_core::Slot;
use slotbridge_storage::EndpointStore;

use crate::slot_map::{SlotMap, SlotStatus};

/// Allocation failure.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Every slot is taken and the map is at its capacity bound. The device
    /// is simply not installed; everything else keeps running.
    #[error("slot capacity exhausted ({0} slots)")]
    CapacityExhausted(usize),
}

/// Identity → slot registry with optional persistence.
pub struct EndpointRegistry {
    map: SlotMap,
    bindings: HashMap<String, Slot>,
    /// Who confirmed each slot in the current discovery session. Guards
    /// against a corrupt store aliasing two identities onto one slot.
    session_owner: HashMap<Slot, String>,
    store: Option<Arc<EndpointStore>>,
}

impl EndpointRegistry {
    /// Registry without persistence: slots are re-allocated from scratch on
    /// every process start.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            map: SlotMap::new(clamp_capacity(capacity)),
            bindings: HashMap::new(),
            session_owner: HashMap::new(),
            store: None,
        }
    }

    /// Registry backed by the endpoint store. Unreadable or corrupt
    /// persisted state degrades to a fresh in-memory start with a warning.
    pub fn with_store(store: Arc<EndpointStore>, capacity: usize) -> Self {
        let capacity = clamp_capacity(capacity);
        let map = match store.load_slot_map() {
            Ok(Some(encoded)) => match SlotMap::decode(&encoded, capacity) {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, "persisted slot map is corrupt, starting fresh");
                    SlotMap::new(capacity)
                }
            },
            Ok(None) => SlotMap::new(capacity),
            Err(e) => {
                warn!(error = %e, "cannot read persisted slot map, starting fresh");
                SlotMap::new(capacity)
            }
        };

        let mut bindings = HashMap::new();
        match store.bindings() {
            Ok(rows) => {
                for (identity, slot) in rows {
                    bindings.insert(identity, Slot(slot));
                }
            }
            Err(e) => warn!(error = %e, "cannot read persisted bindings"),
        }

        Self {
            map,
            bindings,
            session_owner: HashMap::new(),
            store: Some(store),
        }
    }

    /// Start a discovery pass: nothing is confirmed yet this session.
    pub fn begin_pass(&mut self) {
        self.map.begin_session();
        self.session_owner.clear();
    }

    /// Assign (or reconfirm) the slot for one identity.
    pub fn assign(&mut self, identity: &str) -> Result<Slot, RegistryError> {
        if let Some(slot) = self.bindings.get(identity).copied() {
            match self.map.status(slot.index()) {
                Some(SlotStatus::Unconfirmed) => {
                    self.map.set(slot.index(), SlotStatus::Confirmed);
                    self.session_owner.insert(slot, identity.to_string());
                    debug!(identity, %slot, "reconfirmed persisted slot");
                    return Ok(slot);
                }
                Some(SlotStatus::Confirmed) => {
                    match self.session_owner.get(&slot) {
                        // same identity assigned twice this pass: idempotent
                        Some(owner) if owner == identity => return Ok(slot),
                        _ => {
                            warn!(identity, %slot, "slot already claimed this session, rebinding");
                            self.discard_binding(identity);
                        }
                    }
                }
                Some(SlotStatus::Free) | None => {
                    // stale or out-of-bounds binding from a corrupt store
                    warn!(identity, %slot, "persisted binding is stale, rebinding");
                    self.discard_binding(identity);
                }
            }
        }

        // new allocation: leftmost gap first, then grow within capacity
        let index = match self.map.first_free() {
            Some(index) => {
                self.map.set(index, SlotStatus::Confirmed);
                index
            }
            None => self
                .map
                .append(SlotStatus::Confirmed)
                .ok_or(RegistryError::CapacityExhausted(self.map.capacity()))?,
        };
        let slot = Slot(index as u16);

        // the binding must be durable before anyone sees the slot
        if let Some(store) = &self.store {
            if let Err(e) = store.save_binding(identity, slot.0) {
                warn!(identity, %slot, error = %e, "cannot persist binding, continuing in-memory");
            }
        }
        self.bindings.insert(identity.to_string(), slot);
        self.session_owner.insert(slot, identity.to_string());
        debug!(identity, %slot, "allocated new slot");
        Ok(slot)
    }

    /// Assign a slot for an identity discovered after the initial pass and
    /// persist the map immediately (the downstream runtime is already live).
    pub fn assign_now(&mut self, identity: &str) -> Result<Slot, RegistryError> {
        let slot = self.assign(identity)?;
        self.persist_map();
        Ok(slot)
    }

    /// End a discovery pass by persisting the slot map.
    pub fn commit_pass(&mut self) {
        self.persist_map();
    }

    /// Explicitly forget an identity: its slot goes back to the free pool
    /// and the binding record is removed. Never called implicitly.
    pub fn forget(&mut self, identity: &str) -> Option<Slot> {
        let slot = self.bindings.remove(identity)?;
        self.map.set(slot.index(), SlotStatus::Free);
        self.session_owner.remove(&slot);
        if let Some(store) = &self.store {
            if let Err(e) = store.remove_binding(identity) {
                warn!(identity, error = %e, "cannot remove persisted binding");
            }
        }
        self.persist_map();
        Some(slot)
    }

    pub fn slot_of(&self, identity: &str) -> Option<Slot> {
        self.bindings.get(identity).copied()
    }

    /// Encoded slot map (diagnostics and tests).
    pub fn encoded_map(&self) -> String {
        self.map.encode()
    }

    pub fn slot_count(&self) -> usize {
        self.map.len()
    }

    fn discard_binding(&mut self, identity: &str) {
        self.bindings.remove(identity);
        if let Some(store) = &self.store {
            if let Err(e) = store.remove_binding(identity) {
                warn!(identity, error = %e, "cannot remove persisted binding");
            }
        }
    }

    fn persist_map(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_slot_map(&self.map.encode()) {
                warn!(error = %e, "cannot persist slot map, continuing in-memory");
            }
        }
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    capacity.min(u16::MAX as usize + 1)
}
