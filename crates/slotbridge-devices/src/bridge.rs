//! Bridge orchestration service.
//!
//! Owns the session event stream and drives the full flow: discovery on
//! connect, slot assignment, downstream installation, push routing, the
//! late-add path for devices that appear mid-session, and unreachable
//! marking on disconnect. Transport and per-device failures are logged and
//! survived; only event-stream closure ends the run loop.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use slotbridge_core::{BridgeConfig, UnitRuntime, UpdateScope};
use slotbridge_session::{params, SessionError, SessionEvent, SessionHandle};

use crate::capability::CapabilityTable;
use crate::node::{build_nodes, DeviceDescriptor, DeviceNode};
use crate::registry::{EndpointRegistry, RegistryError};
use crate::sync::{PushOutcome, SyncCoordinator};

/// Bridge-level failure. Everything here is per-operation; the run loop
/// itself only ends when the session is gone for good.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("bad discovery payload: {0}")]
    Discovery(String),
}

/// The bridge daemon core.
pub struct Bridge {
    config: BridgeConfig,
    session: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    registry: EndpointRegistry,
    coordinator: SyncCoordinator,
    capabilities: CapabilityTable,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        session: SessionHandle,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        registry: EndpointRegistry,
        runtime: Arc<dyn UnitRuntime>,
    ) -> Self {
        let coordinator = SyncCoordinator::new(runtime, Arc::new(session.clone()));
        Self {
            config,
            session,
            events,
            registry,
            coordinator,
            capabilities: CapabilityTable::builtin(),
        }
    }

    /// Replace the built-in capability table.
    pub fn with_capabilities(mut self, table: CapabilityTable) -> Self {
        self.capabilities = table;
        self
    }

    /// Serve session events until the session shuts down.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                SessionEvent::Connected => {
                    if let Err(e) = self.sync_with_upstream().await {
                        // transport errors here ride the reconnect cycle;
                        // the next Connected event retries discovery
                        warn!(error = %e, "upstream synchronization failed");
                    }
                }
                SessionEvent::Disconnected { reason } => {
                    info!(%reason, "upstream gone, marking all units unreachable");
                    self.coordinator.mark_all_unreachable();
                }
                SessionEvent::Notification { name, body } => {
                    self.handle_notification(&name, body).await;
                }
            }
        }
        info!("session event stream closed, bridge stopping");
    }

    /// Handshake, discover, assign slots, install.
    async fn sync_with_upstream(&mut self) -> Result<(), BridgeError> {
        let hello = self
            .session
            .call(
                "hello",
                params(json!({
                    "application": "slotbridge",
                    "version": slotbridge_core::VERSION,
                })),
            )
            .await?;
        info!(upstream = %hello, "upstream session established");

        let result = self.session.call("listDevices", params(json!({}))).await?;
        let descriptors = parse_device_list(&result)?;
        info!(count = descriptors.len(), "discovery pass complete");

        self.registry.begin_pass();
        for descriptor in &descriptors {
            self.install_descriptor(descriptor, false).await;
        }
        self.registry.commit_pass();
        Ok(())
    }

    /// Build, slot-assign and install the nodes of one descriptor.
    /// `persist_now` selects the late-add path (map persisted immediately).
    async fn install_descriptor(&mut self, descriptor: &DeviceDescriptor, persist_now: bool) {
        let nodes = build_nodes(descriptor, &self.capabilities);
        let mut assigned: Vec<DeviceNode> = Vec::with_capacity(nodes.len());

        for mut node in nodes {
            let result = if persist_now {
                self.registry.assign_now(&node.identity)
            } else {
                self.registry.assign(&node.identity)
            };
            match result {
                Ok(slot) => {
                    node.slot = Some(slot);
                    assigned.push(node);
                }
                Err(e) => {
                    error!(identity = %node.identity, error = %e, "unit not installed");
                    if node.parent.is_none() && node.is_composed() {
                        // without a parent slot no member may be installed
                        return;
                    }
                }
            }
        }

        for node in assigned {
            let identity = node.identity.clone();
            let initial = node.attributes.clone();
            match self.coordinator.install(node).await {
                Ok(_newly_installed) => {
                    for (attribute, value) in initial {
                        if let Err(e) = self
                            .coordinator
                            .apply_update(&identity, &attribute, value, UpdateScope::initial())
                            .await
                        {
                            warn!(identity = %identity, attribute = %attribute, error = %e, "initial value not applied");
                        }
                    }
                }
                Err(e) => error!(identity = %identity, error = %e, "install rejected"),
            }
        }
    }

    async fn handle_notification(&mut self, name: &str, body: slotbridge_session::Params) {
        match self.coordinator.handle_push(name, body).await {
            PushOutcome::Handled | PushOutcome::Ignored => {}
            PushOutcome::DeviceAdded { identity } => {
                if let Err(e) = self.add_device(&identity).await {
                    warn!(identity, error = %e, "late-added device not installed");
                }
            }
            PushOutcome::Vanished { identity } => {
                if self.config.reclaim_on_vanish {
                    for (id, slot) in self.coordinator.remove_tree(&identity) {
                        self.registry.forget(&id);
                        info!(identity = %id, %slot, "reclaimed slot of vanished unit");
                    }
                } else {
                    info!(identity, "device vanished, slot retained");
                }
            }
        }
    }

    /// Late-add path: query a single device and install it against the live
    /// slot map, persisting immediately.
    async fn add_device(&mut self, identity: &str) -> Result<(), BridgeError> {
        let result = self
            .session
            .call("describeDevice", params(json!({"identity": identity})))
            .await?;
        let descriptor: DeviceDescriptor = serde_json::from_value(result)
            .map_err(|e| BridgeError::Discovery(e.to_string()))?;
        self.install_descriptor(&descriptor, true).await;
        Ok(())
    }

    /// Read access for the downstream runtime (and diagnostics).
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut SyncCoordinator {
        &mut self.coordinator
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }
}

fn parse_device_list(result: &Value) -> Result<Vec<DeviceDescriptor>, BridgeError> {
    let devices = result
        .get("devices")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    serde_json::from_value(devices).map_err(|e| BridgeError::Discovery(e.to_string()))
}
