//! Downstream runtime collaborator interface.
//!
//! The downstream device-model runtime (the side that actually exposes
//! bridged units at their slots) is an external collaborator. The bridge only
//! depends on this narrow trait; tests and the CLI supply their own
//! implementations.

use async_trait::async_trait;

use crate::slot::Slot;

/// Errors reported by the downstream runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime refused to install a unit at the given slot.
    #[error("install failed for slot {0}: {1}")]
    Install(Slot, String),

    /// Attribute change could not be reported.
    #[error("attribute report failed for slot {0}: {1}")]
    Report(Slot, String),

    /// Catch-all for runtime-internal failures.
    #[error("runtime error: {0}")]
    Other(String),
}

/// Calls made by the bridge into the downstream runtime.
///
/// The reverse direction (the runtime reading or writing an attribute) goes
/// through the sync coordinator's `read_attribute`/`write_attribute`.
#[async_trait]
pub trait UnitRuntime: Send + Sync {
    /// Register a bridged unit at the given slot. Must be called for a
    /// composed device's parent before any of its members.
    async fn install_unit(&self, slot: Slot) -> Result<(), RuntimeError>;

    /// Report that an attribute of the unit at `slot` changed and is ready to
    /// be read back through the coordinator.
    async fn report_attribute_changed(&self, slot: Slot, attribute: &str)
        -> Result<(), RuntimeError>;
}
