//! Protocol names, precedence and evaluators.

use crate::interface::{InterfaceSnapshot, HW_BOND_CONFIG_RX_ENABLED, HW_BOND_CONFIG_TX_ENABLED};
use crate::map::ForwardingStateMap;

/// Unidirectional link detection.
pub const PROTOCOL_UDLD: &str = "udld";

/// 802.1X port authentication.
pub const PROTOCOL_DOT1X: &str = "dot1x";

/// Link aggregation control protocol.
pub const PROTOCOL_LACP: &str = "lacp";

/// Fixed protocol precedence. Lower discriminant means higher precedence.
///
/// Precedence is only used as a tie-break when a protocol tries to take
/// ownership of a layer that is already blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ProtocolPrecedence {
    Udld = 0,
    Dot1x = 1,
    Lacp = 2,
    /// Unknown protocol; always overridable.
    None = 3,
}

impl ProtocolPrecedence {
    /// Looks up the precedence of a protocol name.
    pub fn of(name: &str) -> Self {
        match name {
            PROTOCOL_UDLD => Self::Udld,
            PROTOCOL_DOT1X => Self::Dot1x,
            PROTOCOL_LACP => Self::Lacp,
            _ => Self::None,
        }
    }

    /// Returns the numeric rank.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Returns true if `self` strictly outranks `other`.
    pub fn preempts(self, other: Self) -> bool {
        self < other
    }
}

/// Decides whether one protocol currently demands a block on an interface.
///
/// Evaluators must be pure: same snapshot and map, same answer.
pub trait ProtocolEvaluator: Send + Sync {
    fn wants_block(&self, intf: &InterfaceSnapshot, state: &ForwardingStateMap) -> bool;
}

impl<F> ProtocolEvaluator for F
where
    F: Fn(&InterfaceSnapshot, &ForwardingStateMap) -> bool + Send + Sync,
{
    fn wants_block(&self, intf: &InterfaceSnapshot, state: &ForwardingStateMap) -> bool {
        self(intf, state)
    }
}

/// LACP blocks a member whose bonding rx and tx are both disabled.
///
/// Missing flags mean the interface is not an LACP member, so LACP has no
/// opinion.
#[derive(Debug, Clone, Copy, Default)]
pub struct LacpEvaluator;

impl ProtocolEvaluator for LacpEvaluator {
    fn wants_block(&self, intf: &InterfaceSnapshot, _state: &ForwardingStateMap) -> bool {
        matches!(
            (
                intf.hw_bond_field(HW_BOND_CONFIG_RX_ENABLED),
                intf.hw_bond_field(HW_BOND_CONFIG_TX_ENABLED),
            ),
            (Some("false"), Some("false"))
        )
    }
}
