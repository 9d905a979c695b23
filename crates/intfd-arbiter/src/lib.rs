//! Interface forwarding-state arbiter.
//!
//! Decides whether a physical interface forwards or blocks traffic when
//! several control protocols may each veto forwarding.
//!
//! - [`LayerRegistry`]: the fixed pipeline of forwarding layers
//!   (health → security → aggregation) and the protocols attached to each
//! - [`Arbiter`]: walks the pipeline for one interface and records the
//!   per-layer and overall verdicts in its [`ForwardingStateMap`]
//! - [`ProtocolEvaluator`]: the predicate a protocol contributes
//!
//! # Forwarding-state map
//!
//! | Key | Value |
//! |-----|-------|
//! | `<layer>.state` | `forwarding` or `blocked` |
//! | `<layer>.owner` | protocol that owns a block (only while blocked) |
//! | `interface.forwarding-state` | state of the terminal layer |
//!
//! # Example
//!
//! ```
//! use sonic_intfd_arbiter::{Arbiter, ForwardingState, ForwardingStateMap, InterfaceSnapshot};
//!
//! let arbiter = Arbiter::builtin();
//! let intf = InterfaceSnapshot::new("1")
//!     .with_admin("up")
//!     .with_bond_flags(false, false);
//!
//! let mut map = ForwardingStateMap::new();
//! arbiter.evaluate_interface(&intf, &mut map);
//!
//! assert_eq!(map.get("aggregation.owner"), Some("lacp"));
//! assert_eq!(map.interface_state(), Some(ForwardingState::Blocked));
//! ```

mod engine;
mod interface;
mod map;
mod protocol;
mod registry;
mod state;

pub use engine::{Arbiter, LayerVerdict, ProtocolOutcome};
pub use interface::{
    InterfaceSnapshot, ADMIN_UP, HW_BOND_CONFIG_RX_ENABLED, HW_BOND_CONFIG_TX_ENABLED,
    INTERFACE_TYPE_SYSTEM, USER_CONFIG_ADMIN,
};
pub use map::ForwardingStateMap;
pub use protocol::{
    LacpEvaluator, ProtocolEvaluator, ProtocolPrecedence, PROTOCOL_DOT1X, PROTOCOL_LACP,
    PROTOCOL_UDLD,
};
pub use registry::{
    Layer, LayerId, LayerRegistry, Protocol, LAYER_AGGREGATION, LAYER_HEALTH, LAYER_SECURITY,
};
pub use state::{
    layer_owner_key, layer_state_key, ForwardingState, BLOCKED, FORWARDING,
    INTERFACE_FORWARDING_STATE,
};
