//! Persistent endpoint state for the slotbridge daemon.
//!
//! A single redb database holds the serialized slot map (one status character
//! per slot under a fixed key) and one `identity -> slot` binding row per
//! bridged identity. Every write commits before returning, so a slot is never
//! observable anywhere without its binding being durable.

pub mod endpoint_map;
pub mod error;

pub use endpoint_map::EndpointStore;
pub use error::{Error, Result};
