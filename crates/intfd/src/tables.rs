//! Table and field names used by intfd.

/// CONFIG_DB table holding per-interface user configuration.
pub const CFG_INTERFACE_TABLE_NAME: &str = "INTERFACE";

/// STATE_DB table holding per-interface bonding sub-state.
pub const STATE_HW_BOND_CONFIG_TABLE_NAME: &str = "INTERFACE_HW_BOND_CONFIG";

/// STATE_DB table holding the forwarding-state map written by intfd.
pub const STATE_FORWARDING_STATE_TABLE_NAME: &str = "INTERFACE_FORWARDING_STATE";

/// Interface row field carrying the interface type.
pub const INTERFACE_FIELD_TYPE: &str = "type";

/// Separator between table name and key in Redis hash names.
pub const TABLE_KEY_SEPARATOR: char = '|';

/// Suffix of the change-notification list for a table.
pub const TABLE_QUEUE_SUFFIX: &str = "@QUEUE";

/// Tables intfd consumes changes from.
pub const CONSUMED_TABLES: [&str; 2] = [CFG_INTERFACE_TABLE_NAME, STATE_HW_BOND_CONFIG_TABLE_NAME];
