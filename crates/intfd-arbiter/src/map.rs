//! Per-interface forwarding-state map.
//!
//! The map is the only state the arbiter persists. It is string-keyed and
//! string-valued so it can be stored verbatim in the external interface
//! table, and it is updated incrementally: the arbiter replaces and removes
//! individual keys, it never rebuilds the map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::{ForwardingState, INTERFACE_FORWARDING_STATE};

/// String-keyed forwarding-state map for one interface.
///
/// Lookups never create entries: keys only appear through
/// [`replace`](Self::replace) or [`add`](Self::add).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForwardingStateMap {
    inner: BTreeMap<String, String>,
}

impl ForwardingStateMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    /// Sets `key` to `value`, overwriting any previous value.
    ///
    /// Returns true if the stored value changed.
    pub fn replace(&mut self, key: &str, value: &str) -> bool {
        match self.inner.get_mut(key) {
            Some(existing) if existing == value => false,
            Some(existing) => {
                *existing = value.to_string();
                true
            }
            None => {
                self.inner.insert(key.to_string(), value.to_string());
                true
            }
        }
    }

    /// Inserts `key` only if it is not present yet.
    ///
    /// Returns true if the key was added.
    pub fn add(&mut self, key: &str, value: &str) -> bool {
        if self.inner.contains_key(key) {
            return false;
        }
        self.inner.insert(key.to_string(), value.to_string());
        true
    }

    /// Removes `key`, returning the previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(key)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Reads a state value stored under `key`.
    pub fn state(&self, key: &str) -> Option<ForwardingState> {
        self.get(key).and_then(ForwardingState::parse)
    }

    /// Returns true only if `key` holds exactly the "blocked" value.
    pub fn is_blocked(&self, key: &str) -> bool {
        self.state(key) == Some(ForwardingState::Blocked)
    }

    /// Returns the overall interface forwarding state, if evaluated.
    pub fn interface_state(&self) -> Option<ForwardingState> {
        self.state(INTERFACE_FORWARDING_STATE)
    }

    /// Converts to field-value pairs for the store.
    pub fn to_field_values(&self) -> Vec<(String, String)> {
        self.inner
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(String, String)> for ForwardingStateMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for ForwardingStateMap {
    fn from(inner: BTreeMap<String, String>) -> Self {
        Self { inner }
    }
}
