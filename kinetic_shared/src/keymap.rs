//! Host-readable keymap descriptors.

use crate::protocol::{CommandEntry, Operation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from logical operation name to the exact command string the firmware dispatches on.
///
/// Persisted as a flat JSON object, e.g. `{"CLOSE": "SWITCH_CLOSE Relay", "OPEN": "SWITCH_OPEN Relay"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeymapDescriptor(BTreeMap<String, String>);

impl KeymapDescriptor {
    pub fn from_entries(entries: &[CommandEntry]) -> Self {
        Self(
            entries
                .iter()
                .map(|entry| (entry.operation.key().to_string(), entry.command.clone()))
                .collect(),
        )
    }

    pub fn get(&self, operation: Operation) -> Option<&str> {
        self.get_key(operation.key())
    }

    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, command: impl Into<String>) {
        self.0.insert(key.into(), command.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
