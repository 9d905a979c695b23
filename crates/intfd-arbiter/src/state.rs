//! Forwarding states and the well-known forwarding-state map keys.

use std::fmt;

/// Key mirroring the verdict of the terminal layer.
pub const INTERFACE_FORWARDING_STATE: &str = "interface.forwarding-state";

/// Value stored for a forwarding layer or interface.
pub const FORWARDING: &str = "forwarding";

/// Value stored for a blocked layer or interface.
pub const BLOCKED: &str = "blocked";

/// Forwarding state of a layer or of the whole interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardingState {
    Forwarding,
    Blocked,
}

impl ForwardingState {
    /// Parses a state value as stored in the forwarding-state map.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            FORWARDING => Some(Self::Forwarding),
            BLOCKED => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Converts to the string stored in the forwarding-state map.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forwarding => FORWARDING,
            Self::Blocked => BLOCKED,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

impl fmt::Display for ForwardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map key holding the state of `layer`.
pub fn layer_state_key(layer: &str) -> String {
    format!("{}.state", layer)
}

/// Map key holding the owner of a blocked `layer`.
pub fn layer_owner_key(layer: &str) -> String {
    format!("{}.owner", layer)
}
