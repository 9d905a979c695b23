//! Storage seam between the interface manager and the databases.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;

use crate::consumer::{FieldValue, KeyOpFieldsValues};
use crate::error::{IntfdError, IntfdResult};
use crate::tables::STATE_FORWARDING_STATE_TABLE_NAME;

/// Source of interface rows and sink for forwarding-state maps.
#[async_trait]
pub trait InterfaceStore: Send {
    /// Reads every row of `table` as SET entries.
    async fn read_table(&mut self, table: &str) -> IntfdResult<Vec<KeyOpFieldsValues>>;

    /// Pops up to `batch_size` queued changes for `table`.
    async fn poll_changes(
        &mut self,
        table: &str,
        batch_size: usize,
    ) -> IntfdResult<Vec<KeyOpFieldsValues>>;

    /// Replaces the stored forwarding-state map of `interface`.
    async fn write_forwarding_state(
        &mut self,
        interface: &str,
        fvs: &[FieldValue],
    ) -> IntfdResult<()>;

    /// Removes the stored forwarding-state map of `interface`.
    async fn delete_forwarding_state(&mut self, interface: &str) -> IntfdResult<()>;
}

type Row = BTreeMap<String, String>;

/// In-process store.
///
/// `set_entry`/`del_entry` behave like a producer: they update the table and
/// queue a change notification. `seed_entry` only updates the table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, BTreeMap<String, Row>>,
    queues: BTreeMap<String, VecDeque<KeyOpFieldsValues>>,
    writes: usize,
    deletes: usize,
    fail_writes: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row without queueing a change.
    pub fn seed_entry(&mut self, table: &str, key: &str, fvs: &[(&str, &str)]) {
        let row = fvs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), row);
    }

    /// Writes a row and queues a SET carrying the full row.
    pub fn set_entry(&mut self, table: &str, key: &str, fvs: &[(&str, &str)]) {
        self.seed_entry(table, key, fvs);
        self.queues
            .entry(table.to_string())
            .or_default()
            .push_back(KeyOpFieldsValues::set_fields(key, fvs));
    }

    /// Removes a row and queues a DEL.
    pub fn del_entry(&mut self, table: &str, key: &str) {
        if let Some(rows) = self.tables.get_mut(table) {
            rows.remove(key);
        }
        self.queues
            .entry(table.to_string())
            .or_default()
            .push_back(KeyOpFieldsValues::del(key));
    }

    /// Returns a stored row.
    pub fn entry(&self, table: &str, key: &str) -> Option<&Row> {
        self.tables.get(table).and_then(|rows| rows.get(key))
    }

    /// Returns the stored forwarding-state map of `interface`.
    pub fn forwarding_state(&self, interface: &str) -> Option<&Row> {
        self.entry(STATE_FORWARDING_STATE_TABLE_NAME, interface)
    }

    /// Number of queued changes for `table`.
    pub fn queued(&self, table: &str) -> usize {
        self.queues.get(table).map_or(0, VecDeque::len)
    }

    /// Number of successful forwarding-state writes.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Number of successful forwarding-state deletes.
    pub fn delete_count(&self) -> usize {
        self.deletes
    }

    /// Makes forwarding-state writes and deletes fail until cleared.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn check_writable(&self, operation: &str) -> IntfdResult<()> {
        if self.fail_writes {
            return Err(IntfdError::store(operation, "store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl InterfaceStore for MemoryStore {
    async fn read_table(&mut self, table: &str) -> IntfdResult<Vec<KeyOpFieldsValues>> {
        Ok(self
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(key, row)| {
                        KeyOpFieldsValues::set(
                            key.clone(),
                            row.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn poll_changes(
        &mut self,
        table: &str,
        batch_size: usize,
    ) -> IntfdResult<Vec<KeyOpFieldsValues>> {
        let Some(queue) = self.queues.get_mut(table) else {
            return Ok(vec![]);
        };
        let count = batch_size.min(queue.len());
        Ok(queue.drain(..count).collect())
    }

    async fn write_forwarding_state(
        &mut self,
        interface: &str,
        fvs: &[FieldValue],
    ) -> IntfdResult<()> {
        self.check_writable("write")?;
        self.tables
            .entry(STATE_FORWARDING_STATE_TABLE_NAME.to_string())
            .or_default()
            .insert(interface.to_string(), fvs.iter().cloned().collect());
        self.writes += 1;
        Ok(())
    }

    async fn delete_forwarding_state(&mut self, interface: &str) -> IntfdResult<()> {
        self.check_writable("delete")?;
        if let Some(rows) = self.tables.get_mut(STATE_FORWARDING_STATE_TABLE_NAME) {
            rows.remove(interface);
        }
        self.deletes += 1;
        Ok(())
    }
}
