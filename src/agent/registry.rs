use super::{AgentDefinition, AgentError};
use kinetic_shared::ComponentDeclaration;
use std::collections::HashSet;

/// Recognized components of one agent, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRegistry {
    agent: String,
    declarations: Vec<ComponentDeclaration>,
}

impl ComponentRegistry {
    /// Classify every declared component. Unrecognized kinds are skipped.
    pub fn discover(agent: &AgentDefinition) -> Result<Self, AgentError> {
        let mut seen = HashSet::new();
        let mut declarations = Vec::with_capacity(agent.components.len());

        for entry in &agent.components {
            let Some(kind) = entry.capability() else {
                tracing::debug!(
                    "Ignoring component '{}' of unrecognized kind '{}'",
                    entry.name,
                    entry.kind
                );
                continue;
            };
            if !is_valid_name(&entry.name) {
                return Err(AgentError::InvalidComponentName(entry.name.clone()));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(AgentError::DuplicateComponent(entry.name.clone()));
            }
            tracing::debug!("Discovered {} '{}'", kind, entry.name);
            declarations.push(ComponentDeclaration::new(entry.name.clone(), kind));
        }

        if declarations.is_empty() {
            return Err(AgentError::NoComponentsFound(agent.name.clone()));
        }
        tracing::info!(
            "Agent '{}': {} components discovered",
            agent.name,
            declarations.len()
        );
        Ok(Self {
            agent: agent.name.clone(),
            declarations,
        })
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn declarations(&self) -> &[ComponentDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Names end up inside command strings and C identifiers.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
