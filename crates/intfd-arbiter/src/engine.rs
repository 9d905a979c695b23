//! Arbiter engine: protocol, layer and interface evaluation.
//!
//! One pass walks the registry in pipeline order. Each layer is forced to
//! blocked when the interface is administratively down or when the upstream
//! layer is blocked; otherwise its protocols are asked in registration order
//! and the first one that wants to block decides the layer for this pass.
//!
//! Ownership (`<layer>.owner`) only records which protocol is held
//! responsible for a block. A blocking protocol takes ownership of an
//! already-blocked layer only if the layer has no owner or the protocol
//! strictly outranks the owner, but any blocking protocol blocks the layer.

use tracing::{debug, info, warn};

use crate::interface::InterfaceSnapshot;
use crate::map::ForwardingStateMap;
use crate::protocol::ProtocolPrecedence;
use crate::registry::{Layer, LayerId, LayerRegistry, Protocol};
use crate::state::{ForwardingState, INTERFACE_FORWARDING_STATE};

/// State and owner of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerVerdict {
    pub state: ForwardingState,
    pub owner: Option<String>,
}

impl LayerVerdict {
    /// Forwarding, no owner.
    pub fn forwarding() -> Self {
        Self {
            state: ForwardingState::Forwarding,
            owner: None,
        }
    }

    /// Blocked, optionally attributed to a protocol.
    pub fn blocked(owner: Option<&str>) -> Self {
        Self {
            state: ForwardingState::Blocked,
            owner: owner.map(str::to_string),
        }
    }

    /// Reads the recorded verdict of `layer`.
    ///
    /// Only the exact "blocked" value counts as blocked; an absent or
    /// unrecognized state reads as forwarding.
    pub fn load(layer: &Layer, map: &ForwardingStateMap) -> Self {
        let state = if map.is_blocked(layer.state_key()) {
            ForwardingState::Blocked
        } else {
            ForwardingState::Forwarding
        };
        Self {
            state,
            owner: map.get(layer.owner_key()).map(str::to_string),
        }
    }

    /// Writes this verdict into `map`. Returns true if the map changed.
    pub fn store(&self, layer: &Layer, map: &mut ForwardingStateMap) -> bool {
        let mut changed = map.replace(layer.state_key(), self.state.as_str());
        changed |= match &self.owner {
            Some(owner) => map.replace(layer.owner_key(), owner),
            None => map.remove(layer.owner_key()).is_some(),
        };
        changed
    }
}

/// Result of asking one protocol about one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutcome {
    /// Raw verdict of the protocol's predicate.
    pub wants_block: bool,
    /// New verdict for the protocol's layer, if it must change.
    pub update: Option<LayerVerdict>,
}

/// Forwarding-state arbiter over a fixed layer registry.
///
/// Built once at startup and shared by reference; evaluation never mutates
/// the registry.
#[derive(Debug)]
pub struct Arbiter {
    registry: LayerRegistry,
}

impl Arbiter {
    pub fn new(registry: LayerRegistry) -> Self {
        Self { registry }
    }

    /// Arbiter over the standard health/security/aggregation pipeline.
    pub fn builtin() -> Self {
        Self::new(LayerRegistry::builtin())
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    /// Decides what `protocol` does to its layer, without touching the map.
    pub fn decide_protocol(
        &self,
        protocol: &Protocol,
        intf: &InterfaceSnapshot,
        map: &ForwardingStateMap,
    ) -> ProtocolOutcome {
        let wants_block = protocol.evaluator().wants_block(intf, map);
        let Some(layer) = self.registry.layer(protocol.layer()) else {
            return ProtocolOutcome {
                wants_block,
                update: None,
            };
        };
        let current = LayerVerdict::load(layer, map);

        let update = if wants_block {
            if current.state.is_blocked() {
                let seize = match current.owner.as_deref() {
                    None => true,
                    Some(owner) => protocol.precedence().preempts(ProtocolPrecedence::of(owner)),
                };
                seize.then(|| LayerVerdict::blocked(Some(protocol.name())))
            } else {
                Some(LayerVerdict::blocked(Some(protocol.name())))
            }
        } else if current.state.is_blocked()
            && current.owner.as_deref() == Some(protocol.name())
        {
            Some(LayerVerdict::forwarding())
        } else {
            None
        };

        ProtocolOutcome {
            wants_block,
            update,
        }
    }

    /// Runs one protocol and applies its ownership bookkeeping.
    ///
    /// Returns the protocol's raw verdict, which is not necessarily the
    /// layer's resulting state.
    pub fn evaluate_protocol(
        &self,
        protocol: &Protocol,
        intf: &InterfaceSnapshot,
        map: &mut ForwardingStateMap,
    ) -> bool {
        let outcome = self.decide_protocol(protocol, intf, map);

        if let (Some(update), Some(layer)) = (&outcome.update, self.registry.layer(protocol.layer())) {
            if update.store(layer, map) {
                match update.state {
                    ForwardingState::Blocked => info!(
                        interface = %intf.name,
                        layer = %layer.name(),
                        owner = %protocol.name(),
                        "Layer blocked"
                    ),
                    ForwardingState::Forwarding => info!(
                        interface = %intf.name,
                        layer = %layer.name(),
                        released_by = %protocol.name(),
                        "Layer forwarding, owner cleared"
                    ),
                }
            }
        }

        outcome.wants_block
    }

    /// Evaluates one layer and records its state in `map`.
    ///
    /// A `LayerId` that does not belong to this arbiter's registry leaves
    /// `map` untouched and reports forwarding.
    pub fn evaluate_layer(
        &self,
        id: LayerId,
        intf: &InterfaceSnapshot,
        map: &mut ForwardingStateMap,
    ) -> ForwardingState {
        let Some(layer) = self.registry.layer(id) else {
            warn!(interface = %intf.name, ?id, "Layer is not registered");
            return ForwardingState::Forwarding;
        };

        if map.add(layer.state_key(), ForwardingState::Forwarding.as_str()) {
            info!(
                interface = %intf.name,
                layer = %layer.name(),
                "Layer forwarding by default"
            );
        }

        if !intf.is_admin_up() {
            if LayerVerdict::blocked(None).store(layer, map) {
                info!(
                    interface = %intf.name,
                    layer = %layer.name(),
                    "Layer blocked because admin state is down"
                );
            }
            return ForwardingState::Blocked;
        }

        if let Some(prev) = self.registry.previous(id) {
            if map.is_blocked(prev.state_key()) {
                if LayerVerdict::blocked(None).store(layer, map) {
                    info!(
                        interface = %intf.name,
                        layer = %layer.name(),
                        upstream = %prev.name(),
                        "Layer blocked because upstream layer is blocked"
                    );
                }
                return ForwardingState::Blocked;
            }
        }

        for protocol in layer.protocols() {
            if self.evaluate_protocol(protocol, intf, map) {
                return ForwardingState::Blocked;
            }
        }

        if LayerVerdict::forwarding().store(layer, map) {
            info!(
                interface = %intf.name,
                layer = %layer.name(),
                "Layer forwarding"
            );
        } else {
            debug!(interface = %intf.name, layer = %layer.name(), "Layer unchanged");
        }
        ForwardingState::Forwarding
    }

    /// Runs a full pass over the pipeline for one interface.
    ///
    /// All effects are written into `map`; the caller persists it.
    pub fn evaluate_interface(&self, intf: &InterfaceSnapshot, map: &mut ForwardingStateMap) {
        let mut terminal = ForwardingState::Forwarding;
        for (id, _) in self.registry.iter() {
            terminal = self.evaluate_layer(id, intf, map);
        }

        if map.replace(INTERFACE_FORWARDING_STATE, terminal.as_str()) {
            info!(interface = %intf.name, state = %terminal, "Interface forwarding state changed");
        }
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::builtin()
    }
}
