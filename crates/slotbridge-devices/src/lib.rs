//! Device model and synchronization core of the slotbridge daemon.
//!
//! The pieces, leaves first:
//! - [`SlotMap`]: the persisted-encoding-backed slot status table
//! - [`EndpointRegistry`]: stable identity → slot assignment across restarts
//! - [`DeviceNode`] / [`CapabilityTable`]: the in-memory unit model built
//!   from upstream discovery data
//! - [`SyncCoordinator`]: directional update propagation without echo
//! - [`Bridge`]: the orchestration service driving all of the above off the
//!   session event stream

pub mod bridge;
pub mod capability;
pub mod node;
pub mod registry;
pub mod slot_map;
pub mod sync;

pub use bridge::{Bridge, BridgeError};
pub use capability::{CapabilityRow, CapabilityTable, CapabilityTag};
pub use node::{build_nodes, member_identity, DeviceDescriptor, DeviceNode, MemberDescriptor};
pub use registry::{EndpointRegistry, RegistryError};
pub use slot_map::{SlotMap, SlotStatus};
pub use sync::{PushOutcome, SyncCoordinator, SyncError, UpstreamSink};
