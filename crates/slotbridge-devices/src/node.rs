//! Bridged unit model.
//!
//! A [`DeviceNode`] is the in-memory representation of one exposed unit:
//! either a whole upstream device or one member of a composed device. Nodes
//! are built from discovery descriptors, handed to the registry for slot
//! assignment, installed downstream, then mutated in place by the sync
//! coordinator for the life of the process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use slotbridge_core::Slot;

use crate::capability::{CapabilityTable, CapabilityTag};

/// A member of a composed device as described by discovery data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDescriptor {
    /// Functional role, part of the derived identity (e.g. "output").
    pub role: String,
    /// Disambiguating index among members with the same role.
    pub sub_id: u32,
    /// Capability-table kind of this member.
    #[serde(default)]
    pub kind: String,
    /// Display name; falls back to the parent's name.
    #[serde(default)]
    pub name: Option<String>,
    /// Initial attribute values.
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// One upstream device as returned by `listDevices` / `describeDevice`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Opaque globally unique identity at the upstream system.
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub zone: String,
    /// Capability-table kind; ignored for composed devices.
    #[serde(default)]
    pub kind: String,
    /// Non-empty for a composed device.
    #[serde(default)]
    pub members: Vec<MemberDescriptor>,
    /// Initial attribute values (single units only).
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// Derive the stable identity of a composed device's member.
///
/// Deterministic by construction: the same physical member always re-derives
/// the same identity across restarts, which is what keeps its slot stable.
pub fn member_identity(base: &str, role: &str, sub_id: u32) -> String {
    format!("{base}_{role}_{sub_id}")
}

/// In-memory state of one exposed unit.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    /// Identity at the upstream system (derived for members).
    pub identity: String,
    /// Set iff this node is a member of a composed device.
    pub parent: Option<String>,
    /// Assigned after registry lookup; `None` before.
    pub slot: Option<Slot>,
    pub name: String,
    pub zone: String,
    pub reachable: bool,
    /// Last-known attribute values.
    pub attributes: HashMap<String, Value>,
    pub capabilities: Vec<CapabilityTag>,
    /// Derived identities of members, install-ordered. Empty for a single
    /// unit; a composed parent carries no functional attributes of its own.
    pub members: Vec<String>,
}

impl DeviceNode {
    pub fn is_composed(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn has_capability(&self, tag: &CapabilityTag) -> bool {
        self.capabilities.contains(tag)
    }
}

/// Build the nodes for one descriptor in install order: for a composed
/// device the parent comes first, so members are only ever installed after
/// the parent has its slot.
pub fn build_nodes(descriptor: &DeviceDescriptor, table: &CapabilityTable) -> Vec<DeviceNode> {
    if descriptor.members.is_empty() {
        return vec![DeviceNode {
            identity: descriptor.identity.clone(),
            parent: None,
            slot: None,
            name: descriptor.name.clone(),
            zone: descriptor.zone.clone(),
            reachable: true,
            attributes: descriptor.attributes.clone(),
            capabilities: table.capabilities_for(&descriptor.kind),
            members: Vec::new(),
        }];
    }

    let member_ids: Vec<String> = descriptor
        .members
        .iter()
        .map(|m| member_identity(&descriptor.identity, &m.role, m.sub_id))
        .collect();

    let mut nodes = Vec::with_capacity(descriptor.members.len() + 1);
    nodes.push(DeviceNode {
        identity: descriptor.identity.clone(),
        parent: None,
        slot: None,
        name: descriptor.name.clone(),
        zone: descriptor.zone.clone(),
        reachable: true,
        attributes: HashMap::new(),
        capabilities: vec![CapabilityTag::Aggregate],
        members: member_ids.clone(),
    });

    for (member, identity) in descriptor.members.iter().zip(member_ids) {
        nodes.push(DeviceNode {
            identity,
            parent: Some(descriptor.identity.clone()),
            slot: None,
            name: member
                .name
                .clone()
                .unwrap_or_else(|| descriptor.name.clone()),
            zone: descriptor.zone.clone(),
            reachable: true,
            attributes: member.attributes.clone(),
            capabilities: table.capabilities_for(&member.kind),
            members: Vec::new(),
        });
    }
    nodes
}
