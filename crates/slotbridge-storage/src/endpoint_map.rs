//! Endpoint store using redb.
//!
//! Two tables back the identity/slot mapping:
//! - `slot_map`: a single row under the key `"slot_map"` holding the encoded
//!   slot status string (its length is the logical slot map length);
//! - `slot_bindings`: one row per identity, `identity -> slot index`.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{Error, Result};

// Slot map table: single row, key = SLOT_MAP_KEY, value = encoded statuses
const SLOT_MAP_TABLE: TableDefinition<&str, &str> = TableDefinition::new("slot_map");

// Bindings table: key = identity, value = slot index
const BINDINGS_TABLE: TableDefinition<&str, u32> = TableDefinition::new("slot_bindings");

const SLOT_MAP_KEY: &str = "slot_map";

/// Persistent store for the slot map and identity bindings.
pub struct EndpointStore {
    db: Database,
}

impl EndpointStore {
    /// Open or create the endpoint store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };

        // make sure both tables exist so later reads never fail on a
        // freshly created database
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SLOT_MAP_TABLE)?;
            let _ = write_txn.open_table(BINDINGS_TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), "endpoint store opened");
        Ok(Arc::new(Self { db }))
    }

    /// Load the encoded slot map, if one was ever persisted.
    pub fn load_slot_map(&self) -> Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SLOT_MAP_TABLE)?;
        match table.get(SLOT_MAP_KEY)? {
            Some(value) => Ok(Some(value.value().to_string())),
            None => Ok(None),
        }
    }

    /// Persist the encoded slot map. Committed before returning.
    pub fn save_slot_map(&self, encoded: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SLOT_MAP_TABLE)?;
            table.insert(SLOT_MAP_KEY, encoded)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up the persisted slot for an identity.
    pub fn load_binding(&self, identity: &str) -> Result<Option<u16>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BINDINGS_TABLE)?;
        match table.get(identity)? {
            Some(value) => {
                let raw = value.value();
                let slot = u16::try_from(raw)
                    .map_err(|_| Error::Corrupt(format!("binding {identity} -> {raw}")))?;
                Ok(Some(slot))
            }
            None => Ok(None),
        }
    }

    /// Persist an identity binding. Committed before returning, so a slot is
    /// never handed out without its binding being durable.
    pub fn save_binding(&self, identity: &str, slot: u16) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BINDINGS_TABLE)?;
            table.insert(identity, slot as u32)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove an identity binding (explicit forget). Returns whether a
    /// binding existed.
    pub fn remove_binding(&self, identity: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let mut table = write_txn.open_table(BINDINGS_TABLE)?;
        let removed = table.remove(identity)?.is_some();
        drop(table);
        write_txn.commit()?;
        Ok(removed)
    }

    /// All persisted bindings, for diagnostics.
    pub fn bindings(&self) -> Result<Vec<(String, u16)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BINDINGS_TABLE)?;
        let mut out = Vec::new();
        for row in table.iter()? {
            let (key, value) = row?;
            if let Ok(slot) = u16::try_from(value.value()) {
                out.push((key.value().to_string(), slot));
            }
        }
        Ok(out)
    }
}
