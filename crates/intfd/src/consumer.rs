//! Coalescing change queue for one consumed table.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Change operation on a table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Row created or rewritten
    Set,
    /// Row removed
    Del,
}

impl Operation {
    /// Parses the wire spelling ("SET" / "DEL").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SET" => Some(Operation::Set),
            "DEL" => Some(Operation::Del),
            _ => None,
        }
    }

    /// Returns the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "SET",
            Operation::Del => "DEL",
        }
    }

    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field-value pair of a table row.
pub type FieldValue = (String, String);

/// One change notification: key, operation and the full row for SET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpFieldsValues {
    /// Row key (the interface name)
    pub key: String,
    /// The operation
    pub op: Operation,
    /// Row fields (empty for Del)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    /// Creates a Set entry from borrowed pairs.
    pub fn set_fields(key: impl Into<String>, fvs: &[(&str, &str)]) -> Self {
        Self::set(
            key,
            fvs.iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }
}

/// Change queue for one table.
///
/// Changes are coalesced per key:
/// - SET after a pending SET replaces it (rows arrive whole)
/// - DEL drops everything pending and queues itself
/// - SET after a pending DEL is queued behind it
///
/// Draining yields keys in sorted order, each key's changes in arrival order.
#[derive(Debug)]
pub struct Consumer {
    table_name: String,
    to_sync: BTreeMap<String, VecDeque<KeyOpFieldsValues>>,
    pending_count: usize,
}

impl Consumer {
    /// Creates an empty queue for `table_name`.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns true if there are pending entries.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Queues changes, coalescing per key.
    pub fn add_to_sync(&mut self, entries: impl IntoIterator<Item = KeyOpFieldsValues>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                self.pending_count -= queue.len();
                queue.clear();
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op.is_set() {
                        *last = entry;
                        return;
                    }
                }
            }
        }

        queue.push_back(entry);
        self.pending_count += 1;
    }

    /// Removes and returns every pending entry.
    pub fn drain(&mut self) -> Vec<KeyOpFieldsValues> {
        let mut result = Vec::with_capacity(self.pending_count);
        for (_key, queue) in std::mem::take(&mut self.to_sync) {
            result.extend(queue);
        }
        self.pending_count = 0;
        result
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .values()
            .flatten()
            .map(|e| format!("{}|{}: {} {:?}", self.table_name, e.key, e.op, e.fvs))
            .collect()
    }
}
