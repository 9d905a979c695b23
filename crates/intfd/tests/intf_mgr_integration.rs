//! IntfMgr driven against the in-process store.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sonic_intfd::{
    sync_once, IntfMgr, MemoryStore, CFG_INTERFACE_TABLE_NAME, STATE_FORWARDING_STATE_TABLE_NAME,
    STATE_HW_BOND_CONFIG_TABLE_NAME,
};
use sonic_intfd_arbiter::Arbiter;

const BATCH: usize = 128;

fn mgr() -> IntfMgr {
    IntfMgr::new(Arc::new(Arbiter::builtin()))
}

fn stored(store: &MemoryStore, interface: &str) -> Vec<(String, String)> {
    store
        .forwarding_state(interface)
        .map(|row| row.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn lacp_block_and_release_reach_the_store() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    store.set_entry(
        CFG_INTERFACE_TABLE_NAME,
        "1",
        &[("type", "system"), ("admin", "up")],
    );
    store.set_entry(
        STATE_HW_BOND_CONFIG_TABLE_NAME,
        "1",
        &[("rx_enabled", "false"), ("tx_enabled", "false")],
    );

    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert_eq!(
        stored(&store, "1"),
        pairs(&[
            ("aggregation.owner", "lacp"),
            ("aggregation.state", "blocked"),
            ("health.state", "forwarding"),
            ("interface.forwarding-state", "blocked"),
            ("security.state", "forwarding"),
        ])
    );

    store.set_entry(
        STATE_HW_BOND_CONFIG_TABLE_NAME,
        "1",
        &[("rx_enabled", "true"), ("tx_enabled", "true")],
    );
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert_eq!(
        stored(&store, "1"),
        pairs(&[
            ("aggregation.state", "forwarding"),
            ("health.state", "forwarding"),
            ("interface.forwarding-state", "forwarding"),
            ("security.state", "forwarding"),
        ])
    );
    assert_eq!(store.write_count(), 2);
}

#[tokio::test]
async fn admin_down_blocks_every_layer_in_store() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "down")]);
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert_eq!(
        stored(&store, "1"),
        pairs(&[
            ("aggregation.state", "blocked"),
            ("health.state", "blocked"),
            ("interface.forwarding-state", "blocked"),
            ("security.state", "blocked"),
        ])
    );
}

#[tokio::test]
async fn unchanged_rows_are_not_rewritten() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    store.set_entry(
        CFG_INTERFACE_TABLE_NAME,
        "1",
        &[("admin", "up"), ("description", "uplink")],
    );
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert_eq!(store.write_count(), 1);
    assert_eq!(mgr.stats().passes, 2);
}

#[tokio::test]
async fn physical_interface_survives_delete() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    store.set_entry(
        CFG_INTERFACE_TABLE_NAME,
        "1",
        &[("type", "system"), ("admin", "up")],
    );
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    store.del_entry(CFG_INTERFACE_TABLE_NAME, "1");
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert!(mgr.interface("1").is_some());
    assert!(store.forwarding_state("1").is_some());
    assert_eq!(store.delete_count(), 0);
    assert_eq!(mgr.stats().rejected_deletions, 1);
}

#[tokio::test]
async fn logical_interface_delete_removes_stored_map() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    store.set_entry(CFG_INTERFACE_TABLE_NAME, "lag1", &[("admin", "up")]);
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();
    assert!(store.forwarding_state("lag1").is_some());

    store.del_entry(CFG_INTERFACE_TABLE_NAME, "lag1");
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert!(store.forwarding_state("lag1").is_none());
    assert_eq!(store.delete_count(), 1);
    assert_eq!(mgr.interface_names().count(), 0);
}

#[tokio::test]
async fn batch_size_limits_each_round() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    for name in ["1", "2", "3"] {
        store.set_entry(CFG_INTERFACE_TABLE_NAME, name, &[("admin", "up")]);
    }

    sync_once(&mut mgr, &mut store, 2).await.unwrap();
    assert_eq!(mgr.interface_names().collect::<Vec<_>>(), vec!["1", "2"]);
    assert_eq!(store.queued(CFG_INTERFACE_TABLE_NAME), 1);

    sync_once(&mut mgr, &mut store, 2).await.unwrap();
    assert_eq!(mgr.interface_names().count(), 3);
    assert!(store.forwarding_state("3").is_some());
}

#[tokio::test]
async fn restart_adopts_stored_maps() {
    let mut store = MemoryStore::new();
    store.seed_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
    store.seed_entry(
        STATE_HW_BOND_CONFIG_TABLE_NAME,
        "1",
        &[("rx_enabled", "false"), ("tx_enabled", "false")],
    );
    // Written by a previous run; still correct.
    store.seed_entry(
        STATE_FORWARDING_STATE_TABLE_NAME,
        "1",
        &[
            ("health.state", "forwarding"),
            ("security.state", "forwarding"),
            ("aggregation.state", "blocked"),
            ("aggregation.owner", "lacp"),
            ("interface.forwarding-state", "blocked"),
        ],
    );
    // Left behind for an interface that is no longer configured.
    store.seed_entry(
        STATE_FORWARDING_STATE_TABLE_NAME,
        "9",
        &[("interface.forwarding-state", "blocked")],
    );

    let mut mgr = mgr();
    mgr.load_initial_state(&mut store).await.unwrap();

    assert!(mgr.has_unflushed());
    assert!(mgr.forwarding_state("9").is_none());
    assert_eq!(
        mgr.forwarding_state("1").unwrap().get("aggregation.owner"),
        Some("lacp")
    );

    mgr.flush(&mut store).await.unwrap();
    assert!(store.forwarding_state("9").is_none());
    assert!(store.forwarding_state("1").is_some());
    assert_eq!(store.delete_count(), 1);
    assert_eq!(store.write_count(), 0);
    assert!(!mgr.has_unflushed());
}

#[tokio::test]
async fn reconfigured_interface_keeps_its_stored_map() {
    let mut store = MemoryStore::new();
    store.seed_entry(
        STATE_FORWARDING_STATE_TABLE_NAME,
        "lag1",
        &[("interface.forwarding-state", "blocked")],
    );

    let mut mgr = mgr();
    mgr.load_initial_state(&mut store).await.unwrap();
    assert!(mgr.has_unflushed());

    // Configured again before the stale map was flushed.
    store.set_entry(CFG_INTERFACE_TABLE_NAME, "lag1", &[("admin", "up")]);
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    assert_eq!(store.delete_count(), 0);
    assert_eq!(
        store
            .forwarding_state("lag1")
            .unwrap()
            .get("interface.forwarding-state")
            .map(String::as_str),
        Some("forwarding")
    );
}

#[tokio::test]
async fn restart_preserves_incumbent_owner() {
    let mut store = MemoryStore::new();
    store.seed_entry(
        CFG_INTERFACE_TABLE_NAME,
        "1",
        &[("admin", "up")],
    );
    store.seed_entry(
        STATE_HW_BOND_CONFIG_TABLE_NAME,
        "1",
        &[("rx_enabled", "false"), ("tx_enabled", "false")],
    );
    // A higher-precedence protocol owned the block before the restart; lacp
    // still blocks but cannot take ownership from it.
    store.seed_entry(
        STATE_FORWARDING_STATE_TABLE_NAME,
        "1",
        &[
            ("aggregation.state", "blocked"),
            ("aggregation.owner", "udld"),
        ],
    );

    let mut mgr = mgr();
    mgr.load_initial_state(&mut store).await.unwrap();

    let map = mgr.forwarding_state("1").unwrap();
    assert_eq!(map.get("aggregation.state"), Some("blocked"));
    assert_eq!(map.get("aggregation.owner"), Some("udld"));
    assert!(mgr.has_unflushed());
}

#[tokio::test]
async fn dump_reports_sorted_interfaces() {
    let mut mgr = mgr();
    let mut store = MemoryStore::new();
    store.set_entry(CFG_INTERFACE_TABLE_NAME, "2", &[("admin", "down")]);
    store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
    sync_once(&mut mgr, &mut store, BATCH).await.unwrap();

    let dump = mgr.dump(None).unwrap();
    let headers: Vec<&str> = dump
        .lines()
        .filter(|line| line.starts_with("Interface"))
        .collect();
    assert_eq!(headers, vec!["Interface 1: forwarding", "Interface 2: blocked"]);
}
