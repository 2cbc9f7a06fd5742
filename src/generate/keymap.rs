//! Keymap descriptors for the host-side component wrappers.

use super::GenerateError;
use kinetic_shared::{command_table, KeymapDescriptor, PinAssignment};

/// A keymap ready to be written, one per component with at least one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapArtifact {
    pub component: String,
    pub file_name: String,
    pub descriptor: KeymapDescriptor,
}

impl KeymapArtifact {
    pub fn to_json(&self) -> Result<String, GenerateError> {
        Ok(serde_json::to_string_pretty(&self.descriptor)?)
    }
}

/// Every keymap file name ends with this.
pub const KEYMAP_SUFFIX: &str = "_keymap.json";

pub fn keymap_file_name(assignment: &PinAssignment) -> String {
    format!(
        "{}_{}{}",
        assignment.component.kind.label(),
        assignment.name(),
        KEYMAP_SUFFIX
    )
}

/// Build the descriptors from the same command table the firmware dispatches on.
pub fn export(assignments: &[PinAssignment]) -> Vec<KeymapArtifact> {
    assignments
        .iter()
        .filter_map(|assignment| {
            let entries = command_table(assignment);
            if entries.is_empty() {
                tracing::debug!("No keymap for '{}', it has no commands", assignment.name());
                return None;
            }
            Some(KeymapArtifact {
                component: assignment.name().to_string(),
                file_name: keymap_file_name(assignment),
                descriptor: KeymapDescriptor::from_entries(&entries),
            })
        })
        .collect()
}
