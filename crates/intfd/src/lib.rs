//! Interface daemon for SONiC.
//!
//! This crate implements the `intfd` daemon, which feeds interface
//! configuration and bonding sub-state through the forwarding-state arbiter
//! and publishes the resulting per-interface forwarding-state maps.
//!
//! # Responsibilities
//!
//! - Track INTERFACE rows and bonding sub-state per interface
//! - Re-run the arbiter for every interface a change touches
//! - Write changed forwarding-state maps back to STATE_DB
//! - Refuse deletion of physical interfaces
//! - Serve `intfd/dump` requests on the control socket
//!
//! # Tables
//!
//! | Database | Table | Purpose |
//! |----------|-------|---------|
//! | CONFIG_DB | INTERFACE | Admin state and interface type |
//! | STATE_DB | INTERFACE_HW_BOND_CONFIG | `rx_enabled` / `tx_enabled` |
//! | STATE_DB | INTERFACE_FORWARDING_STATE | Published forwarding-state maps |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use sonic_intfd::{IntfMgr, MemoryStore, CFG_INTERFACE_TABLE_NAME};
//! use sonic_intfd_arbiter::Arbiter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut store = MemoryStore::new();
//! store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
//!
//! let mut mgr = IntfMgr::new(Arc::new(Arbiter::builtin()));
//! sonic_intfd::sync_once(&mut mgr, &mut store, 128).await.unwrap();
//!
//! assert_eq!(
//!     store.forwarding_state("1").unwrap()["interface.forwarding-state"],
//!     "forwarding"
//! );
//! # }
//! ```

mod config;
mod consumer;
mod control;
mod daemon;
mod error;
mod intf_mgr;
mod orch;
#[cfg(feature = "redis")]
mod redis_store;
mod store;
mod tables;

pub use config::{DaemonConfig, DatabaseConfig, IntfdConfig, DEFAULT_CONFIG_PATH};
pub use consumer::{Consumer, FieldValue, KeyOpFieldsValues, Operation};
pub use control::{ControlCommand, ControlReply, ControlRequest, ControlServer};
pub use daemon::{handle_control, run, sync_once, LoopControl};
pub use error::{IntfdError, IntfdResult};
pub use intf_mgr::{IntfMgr, IntfMgrStats};
pub use orch::Orch;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{InterfaceStore, MemoryStore};
pub use tables::*;
