//! Directional update descriptor.
//!
//! Every state change flowing through the bridge carries an [`UpdateScope`]
//! saying which side(s) to propagate to and whether derived recomputation may
//! run. Expressing this as named flags (instead of a bitmask) keeps the
//! propagation rules matchable in tests.

/// Propagation descriptor for a single attribute update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateScope {
    /// Push the new value into the downstream runtime.
    pub toward_downstream: bool,
    /// Send a corresponding notification back to the upstream system.
    pub toward_upstream: bool,
    /// Do not trigger secondary derived recomputation for this update.
    pub suppress_derivation: bool,
    /// This update was itself produced by a derivation step; never re-enter
    /// the derivation path.
    pub already_chained: bool,
    /// Record the new value but skip the hardware-facing side effect.
    pub defer_apply: bool,
    /// Apply even if the new value equals the cached value.
    pub forced: bool,
}

impl UpdateScope {
    /// Scope for a change that originated upstream (push notification): it is
    /// forwarded downstream only. Re-sending it upstream would at best be a
    /// round trip and at worst a feedback loop.
    pub fn from_upstream() -> Self {
        Self {
            toward_downstream: true,
            ..Self::default()
        }
    }

    /// Scope for a change that originated downstream (write/command): the
    /// authoritative value travels upstream only.
    pub fn from_downstream() -> Self {
        Self {
            toward_upstream: true,
            ..Self::default()
        }
    }

    /// Scope for first-time initialization after installation: forced, so a
    /// value equal to the (empty) cache still reaches the downstream runtime.
    pub fn initial() -> Self {
        Self {
            toward_downstream: true,
            forced: true,
            ..Self::default()
        }
    }

    /// Derive a scope for a chained (derivation-produced) update.
    pub fn chained(self) -> Self {
        Self {
            already_chained: true,
            ..self
        }
    }

    pub fn with_forced(mut self) -> Self {
        self.forced = true;
        self
    }

    pub fn with_suppressed_derivation(mut self) -> Self {
        self.suppress_derivation = true;
        self
    }

    pub fn with_deferred_apply(mut self) -> Self {
        self.defer_apply = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_scopes_are_one_directional() {
        let up = UpdateScope::from_upstream();
        assert!(up.toward_downstream);
        assert!(!up.toward_upstream);

        let down = UpdateScope::from_downstream();
        assert!(down.toward_upstream);
        assert!(!down.toward_downstream);
    }

    #[test]
    fn test_chained_keeps_direction() {
        let scope = UpdateScope::from_upstream().chained();
        assert!(scope.toward_downstream);
        assert!(scope.already_chained);
    }

    #[test]
    fn test_builder_flags_compose() {
        let scope = UpdateScope::from_upstream().with_forced().chained();
        assert!(scope.forced);
        assert!(scope.toward_downstream);
        assert!(scope.already_chained);
        assert!(!scope.toward_upstream);
    }
}
