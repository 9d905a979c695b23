//! Read-only interface snapshot consumed by the arbiter.

use std::collections::BTreeMap;

/// `user_config` key holding the administrative state.
pub const USER_CONFIG_ADMIN: &str = "admin";

/// Administrative state value meaning "enabled".
pub const ADMIN_UP: &str = "up";

/// `hw_bond_config` key: LAG member may receive.
pub const HW_BOND_CONFIG_RX_ENABLED: &str = "rx_enabled";

/// `hw_bond_config` key: LAG member may transmit.
pub const HW_BOND_CONFIG_TX_ENABLED: &str = "tx_enabled";

/// Interface type of physical ports. These rows cannot be deleted.
pub const INTERFACE_TYPE_SYSTEM: &str = "system";

/// View of one interface row as owned by the configuration store.
///
/// The arbiter never writes a snapshot; the daemon rebuilds it from table
/// changes before each evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    /// Interface name (e.g., "1", "Ethernet0").
    pub name: String,
    /// Interface type ("system" for physical ports).
    pub kind: Option<String>,
    /// Administrative configuration.
    pub user_config: BTreeMap<String, String>,
    /// Bonding operational sub-state written by the LACP daemon.
    pub hw_bond_config: BTreeMap<String, String>,
}

impl InterfaceSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the interface type.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets a `user_config` field.
    pub fn with_user_config(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_config.insert(field.into(), value.into());
        self
    }

    /// Sets the administrative state.
    pub fn with_admin(self, admin: &str) -> Self {
        self.with_user_config(USER_CONFIG_ADMIN, admin)
    }

    /// Sets both bonding rx/tx flags.
    pub fn with_bond_flags(mut self, rx_enabled: bool, tx_enabled: bool) -> Self {
        self.hw_bond_config
            .insert(HW_BOND_CONFIG_RX_ENABLED.to_string(), rx_enabled.to_string());
        self.hw_bond_config
            .insert(HW_BOND_CONFIG_TX_ENABLED.to_string(), tx_enabled.to_string());
        self
    }

    /// Returns the configured admin state, if any.
    pub fn admin_state(&self) -> Option<&str> {
        self.user_config.get(USER_CONFIG_ADMIN).map(String::as_str)
    }

    /// An absent admin key counts as down.
    pub fn is_admin_up(&self) -> bool {
        self.admin_state() == Some(ADMIN_UP)
    }

    /// Returns a bonding sub-state field, if present.
    pub fn hw_bond_field(&self, field: &str) -> Option<&str> {
        self.hw_bond_config.get(field).map(String::as_str)
    }

    /// Returns true for physical ports.
    pub fn is_physical(&self) -> bool {
        self.kind.as_deref() == Some(INTERFACE_TYPE_SYSTEM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_state() {
        let intf = InterfaceSnapshot::new("1");
        assert_eq!(intf.admin_state(), None);
        assert!(!intf.is_admin_up());

        let intf = intf.with_admin("down");
        assert!(!intf.is_admin_up());

        let intf = intf.with_admin("up");
        assert!(intf.is_admin_up());
    }

    #[test]
    fn test_bond_flags() {
        let intf = InterfaceSnapshot::new("1").with_bond_flags(false, true);
        assert_eq!(intf.hw_bond_field(HW_BOND_CONFIG_RX_ENABLED), Some("false"));
        assert_eq!(intf.hw_bond_field(HW_BOND_CONFIG_TX_ENABLED), Some("true"));
    }

    #[test]
    fn test_is_physical() {
        assert!(InterfaceSnapshot::new("1").with_kind("system").is_physical());
        assert!(!InterfaceSnapshot::new("lag1").with_kind("internal").is_physical());
        assert!(!InterfaceSnapshot::new("2").is_physical());
    }
}
