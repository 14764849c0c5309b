//! Shared types for the slotbridge daemon.
//!
//! This crate sits at the bottom of the workspace dependency graph and holds
//! the vocabulary every other crate speaks:
//! - [`Slot`]: the small stable endpoint index assigned to a bridged unit
//! - [`UpdateScope`]: the directional descriptor attached to every state change
//! - [`BridgeConfig`]: daemon configuration
//! - [`UnitRuntime`]: the downstream device-model runtime collaborator trait

pub mod config;
pub mod runtime;
pub mod slot;
pub mod update;

pub use config::{BridgeConfig, FrameDelimiter, UpstreamConfig};
pub use runtime::{RuntimeError, UnitRuntime};
pub use slot::Slot;
pub use update::UpdateScope;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
