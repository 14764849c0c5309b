//! Bidirectional synchronization coordinator.
//!
//! Applies every state change exactly once, in the direction(s) its
//! [`UpdateScope`] names, without ever echoing a change back to the side it
//! came from: an upstream push only travels downstream, a downstream write
//! only travels upstream. Composed parents re-derive their aggregate
//! attribute from member changes unless the scope suppresses it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use slotbridge_core::{Slot, UnitRuntime, UpdateScope};
use slotbridge_session::{params, Params, SessionError, SessionHandle};

use crate::node::DeviceNode;

/// Synchronization failure.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("no unit installed at slot {0}")]
    UnknownSlot(Slot),

    #[error("slot {0} is already occupied")]
    SlotOccupied(Slot),

    #[error("node {0} has no assigned slot")]
    Unassigned(String),
}

/// Where the coordinator sends upstream-bound traffic. [`SessionHandle`]
/// implements it; tests substitute a recorder.
#[async_trait]
pub trait UpstreamSink: Send + Sync {
    async fn notify(&self, name: &str, body: Params) -> Result<(), SessionError>;
}

#[async_trait]
impl UpstreamSink for SessionHandle {
    async fn notify(&self, name: &str, body: Params) -> Result<(), SessionError> {
        SessionHandle::notify(self, name, body).await
    }
}

/// What a handled push notification asks the caller to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Fully handled in place.
    Handled,
    /// A device joined upstream; the caller should query and install it.
    DeviceAdded { identity: String },
    /// A device vanished; it is already marked unreachable, reclamation is
    /// the caller's (configured) decision.
    Vanished { identity: String },
    /// Unknown notification; logged and skipped.
    Ignored,
}

/// Routes updates between the upstream session, the node table and the
/// downstream runtime.
pub struct SyncCoordinator {
    nodes: HashMap<String, DeviceNode>,
    by_slot: HashMap<Slot, String>,
    runtime: Arc<dyn UnitRuntime>,
    upstream: Arc<dyn UpstreamSink>,
}

impl SyncCoordinator {
    pub fn new(runtime: Arc<dyn UnitRuntime>, upstream: Arc<dyn UpstreamSink>) -> Self {
        Self {
            nodes: HashMap::new(),
            by_slot: HashMap::new(),
            runtime,
            upstream,
        }
    }

    /// Install a slot-assigned node into the downstream runtime and the node
    /// table. Returns `false` if the identity is already installed (a
    /// re-discovery after reconnect): the node is just marked reachable.
    pub async fn install(&mut self, node: DeviceNode) -> Result<bool, SyncError> {
        let slot = node.slot.ok_or_else(|| SyncError::Unassigned(node.identity.clone()))?;

        if let Some(existing) = self.nodes.get_mut(&node.identity) {
            existing.reachable = true;
            return Ok(false);
        }
        if let Some(occupant) = self.by_slot.get(&slot) {
            if occupant != &node.identity {
                return Err(SyncError::SlotOccupied(slot));
            }
        }

        if let Err(e) = self.runtime.install_unit(slot).await {
            warn!(identity = %node.identity, %slot, error = %e, "downstream install failed");
        }
        self.by_slot.insert(slot, node.identity.clone());
        self.nodes.insert(node.identity.clone(), node);
        Ok(true)
    }

    pub fn node(&self, identity: &str) -> Option<&DeviceNode> {
        self.nodes.get(identity)
    }

    pub fn identity_at(&self, slot: Slot) -> Option<&str> {
        self.by_slot.get(&slot).map(String::as_str)
    }

    /// Apply one attribute update according to its scope.
    pub async fn apply_update(
        &mut self,
        identity: &str,
        attribute: &str,
        value: Value,
        scope: UpdateScope,
    ) -> Result<(), SyncError> {
        let node = self
            .nodes
            .get_mut(identity)
            .ok_or_else(|| SyncError::UnknownIdentity(identity.to_string()))?;

        let unchanged = node.attributes.get(attribute) == Some(&value);
        if unchanged && !scope.forced {
            return Ok(());
        }
        node.attributes.insert(attribute.to_string(), value.clone());
        let slot = node.slot;
        let parent = node.parent.clone();
        debug!(identity, attribute, ?scope, "applying update");

        if scope.toward_downstream {
            if let Some(slot) = slot {
                if let Err(e) = self.runtime.report_attribute_changed(slot, attribute).await {
                    warn!(identity, attribute, error = %e, "downstream report failed");
                }
            }
        }

        if scope.toward_upstream && !scope.defer_apply {
            let body = params(json!({
                "identity": identity,
                "attribute": attribute,
                "value": value,
            }));
            if let Err(e) = self.upstream.notify("setAttribute", body).await {
                warn!(identity, attribute, error = %e, "upstream notify failed");
            }
        }

        if !scope.suppress_derivation && !scope.already_chained {
            if let Some(parent_id) = parent {
                self.derive_parent(&parent_id, attribute, scope).await;
            }
        }
        Ok(())
    }

    /// Recompute a composed parent's aggregate for one attribute. Boolean
    /// attributes aggregate as "any member set"; everything else is left to
    /// the members themselves. The chained application never re-enters
    /// derivation and never travels upstream (it is a local aggregate).
    async fn derive_parent(&mut self, parent_id: &str, attribute: &str, origin: UpdateScope) {
        let Some(parent) = self.nodes.get(parent_id) else {
            return;
        };
        let mut any = false;
        let mut saw_bool = false;
        for member_id in &parent.members {
            if let Some(member) = self.nodes.get(member_id) {
                if let Some(Value::Bool(b)) = member.attributes.get(attribute) {
                    saw_bool = true;
                    any |= *b;
                }
            }
        }
        if !saw_bool {
            return;
        }

        let scope = UpdateScope {
            toward_downstream: true,
            ..UpdateScope::default()
        }
        .chained();
        let scope = if origin.forced {
            scope.with_forced()
        } else {
            scope
        };

        let parent_id = parent_id.to_string();
        let Some(parent) = self.nodes.get_mut(&parent_id) else {
            return;
        };
        let value = Value::Bool(any);
        if parent.attributes.get(attribute) == Some(&value) && !scope.forced {
            return;
        }
        parent.attributes.insert(attribute.to_string(), value);
        let slot = parent.slot;
        debug!(parent = %parent_id, attribute, any, "derived aggregate");

        if let Some(slot) = slot {
            if let Err(e) = self.runtime.report_attribute_changed(slot, attribute).await {
                warn!(parent = %parent_id, attribute, error = %e, "downstream report failed");
            }
        }
    }

    /// Inbound push notification from the upstream session.
    pub async fn handle_push(&mut self, name: &str, body: Params) -> PushOutcome {
        match name {
            "attributeChanged" => {
                let (Some(identity), Some(attribute)) = (
                    body.get("identity").and_then(Value::as_str),
                    body.get("attribute").and_then(Value::as_str),
                ) else {
                    warn!(name, "push notification missing identity/attribute");
                    return PushOutcome::Ignored;
                };
                let value = body.get("value").cloned().unwrap_or(Value::Null);
                let identity = identity.to_string();
                let attribute = attribute.to_string();
                match self
                    .apply_update(&identity, &attribute, value, UpdateScope::from_upstream())
                    .await
                {
                    Ok(()) => PushOutcome::Handled,
                    Err(e) => {
                        warn!(error = %e, "push update not applied");
                        PushOutcome::Ignored
                    }
                }
            }
            "deviceVanished" => match body.get("identity").and_then(Value::as_str) {
                Some(identity) => {
                    let identity = identity.to_string();
                    self.mark_unreachable(&identity);
                    PushOutcome::Vanished { identity }
                }
                None => {
                    warn!(name, "push notification missing identity");
                    PushOutcome::Ignored
                }
            },
            "deviceAdded" => match body.get("identity").and_then(Value::as_str) {
                Some(identity) => PushOutcome::DeviceAdded {
                    identity: identity.to_string(),
                },
                None => {
                    warn!(name, "push notification missing identity");
                    PushOutcome::Ignored
                }
            },
            other => {
                debug!(notification = other, "ignoring unknown push notification");
                PushOutcome::Ignored
            }
        }
    }

    /// Cached value for a downstream read.
    pub fn read_attribute(&self, slot: Slot, attribute: &str) -> Result<Value, SyncError> {
        let identity = self.by_slot.get(&slot).ok_or(SyncError::UnknownSlot(slot))?;
        let node = self
            .nodes
            .get(identity)
            .ok_or_else(|| SyncError::UnknownIdentity(identity.clone()))?;
        Ok(node
            .attributes
            .get(attribute)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Downstream-originated write: the authoritative value travels upstream
    /// only; the cache is updated optimistically and a later push confirms.
    pub async fn write_attribute(
        &mut self,
        slot: Slot,
        attribute: &str,
        value: Value,
    ) -> Result<(), SyncError> {
        let identity = self
            .by_slot
            .get(&slot)
            .ok_or(SyncError::UnknownSlot(slot))?
            .clone();
        self.apply_update(&identity, attribute, value, UpdateScope::from_downstream())
            .await
    }

    /// Mark a node (and, for a composed parent, all its members)
    /// unreachable. The slot stays allocated.
    pub fn mark_unreachable(&mut self, identity: &str) {
        let members = match self.nodes.get_mut(identity) {
            Some(node) => {
                node.reachable = false;
                node.members.clone()
            }
            None => return,
        };
        for member_id in members {
            if let Some(member) = self.nodes.get_mut(&member_id) {
                member.reachable = false;
            }
        }
    }

    /// Mark every node unreachable (upstream connection lost).
    pub fn mark_all_unreachable(&mut self) {
        for node in self.nodes.values_mut() {
            node.reachable = false;
        }
    }

    /// Remove a node and its members from the table, returning the freed
    /// identities and slots. Only used by the opt-in reclamation path.
    pub fn remove_tree(&mut self, identity: &str) -> Vec<(String, Slot)> {
        let Some(node) = self.nodes.remove(identity) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        for member_id in &node.members {
            if let Some(member) = self.nodes.remove(member_id) {
                if let Some(slot) = member.slot {
                    self.by_slot.remove(&slot);
                    removed.push((member_id.clone(), slot));
                }
            }
        }
        if let Some(slot) = node.slot {
            self.by_slot.remove(&slot);
            removed.push((identity.to_string(), slot));
        }
        removed
    }
}
