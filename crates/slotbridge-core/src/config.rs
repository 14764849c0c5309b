//! Daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Frame delimiter used by the upstream wire protocol.
///
/// Fixed per deployment variant: some upstream services terminate each JSON
/// object with a newline, others with a single NUL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDelimiter {
    #[default]
    Newline,
    Nul,
}

impl FrameDelimiter {
    pub fn byte(self) -> u8 {
        match self {
            Self::Newline => b'\n',
            Self::Nul => 0,
        }
    }
}

/// Connection settings for the upstream session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream host.
    pub host: String,
    /// Upstream port.
    pub port: u16,
    /// Frame delimiter variant.
    pub delimiter: FrameDelimiter,
    /// Delay before a reconnect attempt after a transport failure, seconds.
    pub reconnect_delay_secs: u64,
    /// Upper bound on a single frame; larger frames drop the connection.
    pub max_frame_len: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_port(),
            delimiter: FrameDelimiter::Newline,
            reconnect_delay_secs: default_reconnect_delay(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl UpstreamConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn default_port() -> u16 {
    4520
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_max_frame_len() -> usize {
    1024 * 1024
}
fn default_slot_capacity() -> usize {
    64
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upstream session settings.
    pub upstream: UpstreamConfig,
    /// Maximum number of endpoint slots.
    pub slot_capacity: usize,
    /// Path of the persistent endpoint store. `None` runs fully in-memory
    /// (slots are re-allocated from scratch on every start).
    pub store_path: Option<PathBuf>,
    /// Free a vanished device's slot and forget its binding. Off by default:
    /// keeping the slot preserves the identity/slot binding should the device
    /// come back, at the cost of capacity over long lifetimes.
    pub reclaim_on_vanish: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            slot_capacity: default_slot_capacity(),
            store_path: None,
            reclaim_on_vanish: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.slot_capacity, 64);
        assert_eq!(cfg.upstream.reconnect_delay_secs, 5);
        assert_eq!(cfg.upstream.delimiter, FrameDelimiter::Newline);
        assert!(!cfg.reclaim_on_vanish);
    }

    #[test]
    fn test_partial_json() {
        let cfg: BridgeConfig =
            serde_json::from_str(r#"{"upstream": {"host": "vdc.local", "delimiter": "nul"}}"#)
                .unwrap();
        assert_eq!(cfg.upstream.host, "vdc.local");
        assert_eq!(cfg.upstream.delimiter, FrameDelimiter::Nul);
        assert_eq!(cfg.upstream.port, 4520);
    }
}
