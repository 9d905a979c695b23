//! Interface Manager - reconciles interface rows into forwarding state

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use sonic_intfd_arbiter::{
    Arbiter, ForwardingStateMap, InterfaceSnapshot, INTERFACE_FORWARDING_STATE,
};
use tracing::{debug, info, instrument, warn};

use crate::consumer::{Consumer, FieldValue, KeyOpFieldsValues};
use crate::error::{IntfdError, IntfdResult};
use crate::orch::Orch;
use crate::store::InterfaceStore;
use crate::tables::*;

/// Counters kept by [`IntfMgr`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntfMgrStats {
    /// Arbiter passes run
    pub passes: u64,
    /// Layer state or owner changes observed across passes
    pub transitions: u64,
    /// Forwarding-state maps written to the store
    pub store_writes: u64,
    /// Forwarding-state maps deleted from the store
    pub store_deletes: u64,
    /// Interface deletions refused
    pub rejected_deletions: u64,
}

/// Interface Manager
///
/// Caches the INTERFACE and INTERFACE_HW_BOND_CONFIG rows, runs the arbiter
/// for every interface a change touches and keeps the resulting
/// forwarding-state maps until they are flushed to the store.
///
/// Bond rows for interfaces that have no INTERFACE row are cached and only
/// take effect once the interface is configured.
pub struct IntfMgr {
    arbiter: Arc<Arbiter>,

    /// Configured interfaces
    interfaces: BTreeMap<String, InterfaceSnapshot>,

    /// Bond sub-state by interface, configured or not
    bond_configs: BTreeMap<String, BTreeMap<String, String>>,

    /// Forwarding-state maps of configured interfaces
    forwarding: BTreeMap<String, ForwardingStateMap>,

    interface_consumer: Consumer,
    bond_consumer: Consumer,

    /// Maps changed since the last flush
    dirty: BTreeSet<String>,

    /// Maps to delete on the next flush
    removed: BTreeSet<String>,

    stats: IntfMgrStats,
}

impl IntfMgr {
    /// Create a new IntfMgr driving `arbiter`
    pub fn new(arbiter: Arc<Arbiter>) -> Self {
        info!(
            "IntfMgr initialized with {} forwarding layers",
            arbiter.registry().len()
        );

        Self {
            arbiter,
            interfaces: BTreeMap::new(),
            bond_configs: BTreeMap::new(),
            forwarding: BTreeMap::new(),
            interface_consumer: Consumer::new(CFG_INTERFACE_TABLE_NAME),
            bond_consumer: Consumer::new(STATE_HW_BOND_CONFIG_TABLE_NAME),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
            stats: IntfMgrStats::default(),
        }
    }

    /// Returns the arbiter
    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// Returns the counters
    pub fn stats(&self) -> &IntfMgrStats {
        &self.stats
    }

    /// Returns the snapshot of a configured interface
    pub fn interface(&self, name: &str) -> Option<&InterfaceSnapshot> {
        self.interfaces.get(name)
    }

    /// Returns the forwarding-state map of a configured interface
    pub fn forwarding_state(&self, name: &str) -> Option<&ForwardingStateMap> {
        self.forwarding.get(name)
    }

    /// Names of configured interfaces, sorted
    pub fn interface_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    /// Returns true if maps are waiting to be written or deleted
    pub fn has_unflushed(&self) -> bool {
        !self.dirty.is_empty() || !self.removed.is_empty()
    }

    /// Queues changes for `table`. Changes for other tables are ignored.
    pub fn add_to_sync(&mut self, table: &str, changes: Vec<KeyOpFieldsValues>) {
        match table {
            CFG_INTERFACE_TABLE_NAME => self.interface_consumer.add_to_sync(changes),
            STATE_HW_BOND_CONFIG_TABLE_NAME => self.bond_consumer.add_to_sync(changes),
            _ => warn!("Ignoring {} changes for unconsumed table {}", changes.len(), table),
        }
    }

    /// Pulls queued changes from `store` into the consumers.
    ///
    /// Returns the number of changes pulled.
    pub async fn poll_store<S>(&mut self, store: &mut S, batch_size: usize) -> IntfdResult<usize>
    where
        S: InterfaceStore + ?Sized,
    {
        let mut total = 0;
        for table in CONSUMED_TABLES {
            let changes = store.poll_changes(table, batch_size).await?;
            if !changes.is_empty() {
                debug!("Pulled {} changes from {}", changes.len(), table);
                total += changes.len();
                self.add_to_sync(table, changes);
            }
        }
        Ok(total)
    }

    /// Applies all queued changes and re-evaluates the touched interfaces.
    pub fn process_pending(&mut self) {
        let mut touched = BTreeSet::new();

        for change in self.interface_consumer.drain() {
            if self.apply_interface_change(change.clone()) {
                touched.insert(change.key);
            }
        }
        for change in self.bond_consumer.drain() {
            self.apply_bond_change(&change);
            touched.insert(change.key);
        }

        for name in touched {
            if self.interfaces.contains_key(&name) {
                self.evaluate(&name);
            }
        }
    }

    /// Applies one INTERFACE change. Returns true if the interface needs
    /// re-evaluation.
    fn apply_interface_change(&mut self, change: KeyOpFieldsValues) -> bool {
        let name = change.key;
        if change.op.is_del() {
            match self.validate_deletion(&name) {
                Ok(()) => self.forget(&name),
                Err(e) => {
                    warn!("{}", e);
                    self.stats.rejected_deletions += 1;
                }
            }
            return false;
        }

        let snapshot = self
            .interfaces
            .entry(name.clone())
            .or_insert_with(|| InterfaceSnapshot::new(name.clone()));
        apply_interface_row(snapshot, change.fvs);
        snapshot.hw_bond_config = self.bond_configs.get(&name).cloned().unwrap_or_default();

        if self.removed.remove(&name) {
            debug!("Interface {} re-created before flush", name);
        }
        true
    }

    fn apply_bond_change(&mut self, change: &KeyOpFieldsValues) {
        let bond = if change.op.is_set() {
            let row: BTreeMap<String, String> = change.fvs.iter().cloned().collect();
            self.bond_configs.insert(change.key.clone(), row.clone());
            row
        } else {
            self.bond_configs.remove(&change.key);
            BTreeMap::new()
        };

        if let Some(snapshot) = self.interfaces.get_mut(&change.key) {
            snapshot.hw_bond_config = bond;
        }
    }

    /// Checks whether the INTERFACE row of `name` may be deleted.
    pub fn validate_deletion(&self, name: &str) -> IntfdResult<()> {
        match self.interfaces.get(name) {
            Some(snapshot) if snapshot.is_physical() => Err(IntfdError::deletion_rejected(
                name,
                "Physical interfaces cannot be deleted",
            )),
            _ => Ok(()),
        }
    }

    fn forget(&mut self, name: &str) {
        if self.interfaces.remove(name).is_none() {
            debug!("DEL for unknown interface {}", name);
            return;
        }
        self.forwarding.remove(name);
        self.dirty.remove(name);
        self.removed.insert(name.to_string());
        info!("Interface {} removed", name);
    }

    /// Runs the arbiter for one configured interface.
    #[instrument(skip(self), fields(interface = %name))]
    fn evaluate(&mut self, name: &str) {
        let Some(snapshot) = self.interfaces.get(name) else {
            return;
        };
        let map = self.forwarding.entry(name.to_string()).or_default();
        let before = map.clone();

        self.arbiter.evaluate_interface(snapshot, map);
        self.stats.passes += 1;

        if *map == before {
            debug!("No forwarding change");
            return;
        }

        let transitions = self
            .arbiter
            .registry()
            .iter()
            .filter(|(_, layer)| {
                before.get(layer.state_key()) != map.get(layer.state_key())
                    || before.get(layer.owner_key()) != map.get(layer.owner_key())
            })
            .count();
        self.stats.transitions += transitions as u64;
        self.dirty.insert(name.to_string());

        debug!(
            transitions,
            state = map.get(INTERFACE_FORWARDING_STATE).unwrap_or_default(),
            "Forwarding state changed"
        );
    }

    /// Writes changed maps and deletes removed ones.
    ///
    /// Entries that fail stay queued for the next flush.
    pub async fn flush<S>(&mut self, store: &mut S) -> IntfdResult<()>
    where
        S: InterfaceStore + ?Sized,
    {
        for name in self.removed.clone() {
            store.delete_forwarding_state(&name).await?;
            self.removed.remove(&name);
            self.stats.store_deletes += 1;
        }

        for name in self.dirty.clone() {
            let fvs: Vec<FieldValue> = self
                .forwarding
                .get(&name)
                .map(ForwardingStateMap::to_field_values)
                .unwrap_or_default();
            store.write_forwarding_state(&name, &fvs).await?;
            self.dirty.remove(&name);
            self.stats.store_writes += 1;
        }

        Ok(())
    }

    /// Loads every table from `store` and evaluates all configured
    /// interfaces.
    ///
    /// Stored forwarding-state maps of configured interfaces are adopted, so
    /// evaluation continues from the last written state and unchanged maps
    /// are not rewritten. Maps left behind for interfaces that are no longer
    /// configured are deleted by the next [`flush`](Self::flush).
    pub async fn load_initial_state<S>(&mut self, store: &mut S) -> IntfdResult<()>
    where
        S: InterfaceStore + ?Sized,
    {
        let interfaces = store.read_table(CFG_INTERFACE_TABLE_NAME).await?;
        let bonds = store.read_table(STATE_HW_BOND_CONFIG_TABLE_NAME).await?;
        let stored = store.read_table(STATE_FORWARDING_STATE_TABLE_NAME).await?;

        let configured: BTreeSet<&str> = interfaces.iter().map(|e| e.key.as_str()).collect();
        for entry in &stored {
            if configured.contains(entry.key.as_str()) {
                self.forwarding
                    .insert(entry.key.clone(), entry.fvs.iter().cloned().collect());
            } else {
                debug!("Stored map for unconfigured interface {} queued for deletion", entry.key);
                self.removed.insert(entry.key.clone());
            }
        }

        info!(
            "Loaded {} interfaces, {} bond rows, {} stored maps",
            interfaces.len(),
            bonds.len(),
            stored.len()
        );

        self.add_to_sync(CFG_INTERFACE_TABLE_NAME, interfaces);
        self.add_to_sync(STATE_HW_BOND_CONFIG_TABLE_NAME, bonds);
        self.process_pending();
        Ok(())
    }

    fn selected(&self, interface: Option<&str>) -> IntfdResult<Vec<&str>> {
        match interface {
            Some(name) => self
                .interfaces
                .get_key_value(name)
                .map(|(key, _)| vec![key.as_str()])
                .ok_or_else(|| IntfdError::unknown_interface(name)),
            None => Ok(self.interface_names().collect()),
        }
    }

    /// Renders the forwarding state of one or all interfaces.
    pub fn dump(&self, interface: Option<&str>) -> IntfdResult<String> {
        let mut out = String::new();
        let empty = ForwardingStateMap::new();

        for name in self.selected(interface)? {
            let map = self.forwarding.get(name).unwrap_or(&empty);
            let _ = writeln!(
                out,
                "Interface {}: {}",
                name,
                map.get(INTERFACE_FORWARDING_STATE).unwrap_or("unknown")
            );
            for (_, layer) in self.arbiter.registry().iter() {
                let state = map.get(layer.state_key()).unwrap_or("unknown");
                match map.get(layer.owner_key()) {
                    Some(owner) => {
                        let _ = writeln!(out, "  {}: {} (owner: {})", layer.name(), state, owner);
                    }
                    None => {
                        let _ = writeln!(out, "  {}: {}", layer.name(), state);
                    }
                }
            }
        }

        Ok(out)
    }

    /// Renders the forwarding-state maps of one or all interfaces as JSON.
    pub fn dump_json(&self, interface: Option<&str>) -> IntfdResult<String> {
        let empty = ForwardingStateMap::new();
        let maps: BTreeMap<&str, &ForwardingStateMap> = self
            .selected(interface)?
            .into_iter()
            .map(|name| (name, self.forwarding.get(name).unwrap_or(&empty)))
            .collect();

        serde_json::to_string_pretty(&maps).map_err(|e| IntfdError::control(e.to_string()))
    }
}

/// Replaces the user configuration of `snapshot` with an INTERFACE row.
fn apply_interface_row(snapshot: &mut InterfaceSnapshot, fvs: Vec<FieldValue>) {
    snapshot.kind = None;
    snapshot.user_config.clear();
    for (field, value) in fvs {
        if field == INTERFACE_FIELD_TYPE {
            snapshot.kind = Some(value);
        } else {
            snapshot.user_config.insert(field, value);
        }
    }
}

#[async_trait]
impl Orch for IntfMgr {
    fn name(&self) -> &str {
        "IntfMgr"
    }

    async fn do_task(&mut self) {
        self.process_pending();
    }

    fn has_pending_tasks(&self) -> bool {
        self.interface_consumer.has_pending() || self.bond_consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut tasks = self.interface_consumer.dump();
        tasks.extend(self.bond_consumer.dump());
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mgr() -> IntfMgr {
        IntfMgr::new(Arc::new(Arbiter::builtin()))
    }

    fn set_interface(mgr: &mut IntfMgr, name: &str, fvs: &[(&str, &str)]) {
        mgr.add_to_sync(
            CFG_INTERFACE_TABLE_NAME,
            vec![KeyOpFieldsValues::set_fields(name, fvs)],
        );
    }

    fn set_bond(mgr: &mut IntfMgr, name: &str, rx: &str, tx: &str) {
        mgr.add_to_sync(
            STATE_HW_BOND_CONFIG_TABLE_NAME,
            vec![KeyOpFieldsValues::set_fields(
                name,
                &[("rx_enabled", rx), ("tx_enabled", tx)],
            )],
        );
    }

    #[test]
    fn test_admin_up_interface_forwards() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("type", "system"), ("admin", "up")]);
        assert!(mgr.has_pending_tasks());

        mgr.process_pending();

        assert!(!mgr.has_pending_tasks());
        let map = mgr.forwarding_state("1").unwrap();
        assert_eq!(map.get(INTERFACE_FORWARDING_STATE), Some("forwarding"));
        assert_eq!(mgr.interface("1").unwrap().kind.as_deref(), Some("system"));
        assert!(!mgr.interface("1").unwrap().user_config.contains_key("type"));
        assert!(mgr.has_unflushed());
        assert_eq!(mgr.stats().passes, 1);
        assert_eq!(mgr.stats().transitions, 3);
    }

    #[test]
    fn test_interface_row_replaces_user_config() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "up"), ("description", "uplink")]);
        mgr.process_pending();

        set_interface(&mut mgr, "1", &[("admin", "up")]);
        mgr.process_pending();

        let snapshot = mgr.interface("1").unwrap();
        assert!(!snapshot.user_config.contains_key("description"));
        assert_eq!(snapshot.kind, None);
    }

    #[test]
    fn test_bond_change_before_interface_is_cached() {
        let mut mgr = mgr();
        set_bond(&mut mgr, "1", "false", "false");
        mgr.process_pending();
        assert!(mgr.forwarding_state("1").is_none());
        assert_eq!(mgr.stats().passes, 0);

        set_interface(&mut mgr, "1", &[("admin", "up")]);
        mgr.process_pending();

        let map = mgr.forwarding_state("1").unwrap();
        assert_eq!(map.get("aggregation.owner"), Some("lacp"));
        assert_eq!(map.get(INTERFACE_FORWARDING_STATE), Some("blocked"));
    }

    #[test]
    fn test_bond_del_releases_lacp_block() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "up")]);
        set_bond(&mut mgr, "1", "false", "false");
        mgr.process_pending();
        assert_eq!(
            mgr.forwarding_state("1").unwrap().get("aggregation.state"),
            Some("blocked")
        );

        mgr.add_to_sync(
            STATE_HW_BOND_CONFIG_TABLE_NAME,
            vec![KeyOpFieldsValues::del("1")],
        );
        mgr.process_pending();

        let map = mgr.forwarding_state("1").unwrap();
        assert_eq!(map.get("aggregation.state"), Some("forwarding"));
        assert!(!map.contains_key("aggregation.owner"));
    }

    #[test]
    fn test_physical_interface_deletion_rejected() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("type", "system"), ("admin", "up")]);
        mgr.process_pending();

        let err = mgr.validate_deletion("1").unwrap_err();
        assert!(matches!(err, IntfdError::DeletionRejected { .. }));

        mgr.add_to_sync(CFG_INTERFACE_TABLE_NAME, vec![KeyOpFieldsValues::del("1")]);
        mgr.process_pending();

        assert!(mgr.interface("1").is_some());
        assert!(mgr.forwarding_state("1").is_some());
        assert_eq!(mgr.stats().rejected_deletions, 1);
    }

    #[test]
    fn test_logical_interface_deletion_forgets_state() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "lag1", &[("admin", "up")]);
        mgr.process_pending();
        assert!(mgr.validate_deletion("lag1").is_ok());

        mgr.add_to_sync(
            CFG_INTERFACE_TABLE_NAME,
            vec![KeyOpFieldsValues::del("lag1")],
        );
        mgr.process_pending();

        assert!(mgr.interface("lag1").is_none());
        assert!(mgr.forwarding_state("lag1").is_none());
        assert!(mgr.has_unflushed());
    }

    #[test]
    fn test_unchanged_pass_is_not_dirty() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "down")]);
        mgr.process_pending();
        mgr.dirty.clear();

        set_interface(&mut mgr, "1", &[("admin", "down")]);
        mgr.process_pending();

        assert!(!mgr.has_unflushed());
        assert_eq!(mgr.stats().passes, 2);
    }

    #[test]
    fn test_add_to_sync_ignores_other_tables() {
        let mut mgr = mgr();
        mgr.add_to_sync("PORT", vec![KeyOpFieldsValues::del("1")]);
        assert!(!mgr.has_pending_tasks());
    }

    #[test]
    fn test_dump() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "up")]);
        set_bond(&mut mgr, "1", "false", "false");
        set_interface(&mut mgr, "2", &[("admin", "up")]);
        mgr.process_pending();

        assert_eq!(
            mgr.dump(Some("1")).unwrap(),
            "Interface 1: blocked\n\
             \x20 health: forwarding\n\
             \x20 security: forwarding\n\
             \x20 aggregation: blocked (owner: lacp)\n"
        );

        let all = mgr.dump(None).unwrap();
        let first = all.find("Interface 1:").unwrap();
        let second = all.find("Interface 2:").unwrap();
        assert!(first < second);

        assert!(matches!(
            mgr.dump(Some("9")),
            Err(IntfdError::UnknownInterface { .. })
        ));
    }

    #[test]
    fn test_dump_json() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "down")]);
        mgr.process_pending();

        let json: serde_json::Value = serde_json::from_str(&mgr.dump_json(None).unwrap()).unwrap();
        assert_eq!(json["1"]["health.state"], "blocked");
        assert_eq!(json["1"][INTERFACE_FORWARDING_STATE], "blocked");
    }

    #[test]
    fn test_dump_single_interface_outlives_request_name() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "down")]);
        set_interface(&mut mgr, "2", &[("admin", "up")]);
        mgr.process_pending();

        let dump = {
            let requested = String::from("1");
            mgr.dump_json(Some(&requested)).unwrap()
        };
        let json: serde_json::Value = serde_json::from_str(&dump).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert_eq!(json["1"][INTERFACE_FORWARDING_STATE], "blocked");

        let requested = String::from("9");
        assert!(matches!(
            mgr.dump_json(Some(&requested)),
            Err(IntfdError::UnknownInterface { .. })
        ));
    }

    #[test]
    fn test_dump_pending_tasks() {
        let mut mgr = mgr();
        set_interface(&mut mgr, "1", &[("admin", "up")]);
        set_bond(&mut mgr, "1", "true", "true");

        let tasks = mgr.dump_pending_tasks();
        assert_eq!(tasks.len(), 2);
        assert!(tasks[0].starts_with("INTERFACE|1: SET"));
        assert!(tasks[1].starts_with("INTERFACE_HW_BOND_CONFIG|1: SET"));
    }
}
