//! Agent definitions: the declared set of hardware components of one robot.
//!
//! ```toml
//! name = "TestBot"
//!
//! [[components]]
//! name = "MotorLeft"
//! kind = "motor"
//! pwm = true
//! direction = true
//!
//! [[components]]
//! name = "Battery"
//! kind = "voltage_sensor"
//! ```

pub mod registry;

pub use registry::ComponentRegistry;

use kinetic_shared::ComponentKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("agent '{0}' declares no recognized components")]
    NoComponentsFound(String),
    #[error("component name '{0}' is declared more than once")]
    DuplicateComponent(String),
    #[error("component name '{0}' must be ASCII letters, digits or '_' and not start with a digit")]
    InvalidComponentName(String),
}

/// One declared component instance, as written in the agent file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComponentEntry {
    pub name: String,
    /// Capability tag; unknown tags are skipped during discovery.
    pub kind: String,
    #[serde(default = "default_true")]
    pub pwm: bool,
    #[serde(default = "default_true")]
    pub direction: bool,
    #[serde(default)]
    pub generate_ignore: bool,
}

impl ComponentEntry {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            pwm: true,
            direction: true,
            generate_ignore: false,
        }
    }

    pub fn motor(name: impl Into<String>, pwm: bool, direction: bool) -> Self {
        Self {
            pwm,
            direction,
            ..Self::new(name, "motor")
        }
    }

    pub fn distance_sensor(name: impl Into<String>) -> Self {
        Self::new(name, "distance_sensor")
    }

    pub fn voltage_sensor(name: impl Into<String>) -> Self {
        Self::new(name, "voltage_sensor")
    }

    pub fn switch(name: impl Into<String>) -> Self {
        Self::new(name, "switch")
    }

    pub fn generic(name: impl Into<String>) -> Self {
        Self::new(name, "generic")
    }

    /// Classify the capability tag. `None` for tags this generator does not know.
    pub fn capability(&self) -> Option<ComponentKind> {
        match self.kind.to_ascii_lowercase().as_str() {
            "motor" => Some(ComponentKind::Motor {
                pwm_enabled: self.pwm,
                direction_enabled: self.direction,
            }),
            "distance_sensor" | "vl53l0x" => Some(ComponentKind::DistanceSensor),
            "voltage_sensor" => Some(ComponentKind::VoltageSensor),
            "switch" => Some(ComponentKind::Switch),
            "generic" => Some(ComponentKind::Generic {
                generate_ignore: self.generate_ignore,
            }),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A named robot and its components in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    /// Register a component after the ones already declared.
    pub fn register(&mut self, entry: ComponentEntry) -> &mut Self {
        self.components.push(entry);
        self
    }

    pub fn with(mut self, entry: ComponentEntry) -> Self {
        self.register(entry);
        self
    }

    pub fn from_toml(content: &str) -> Result<Self, AgentError> {
        Ok(toml::from_str(content)?)
    }
}

pub fn load_agent(path: impl AsRef<Path>) -> Result<AgentDefinition, AgentError> {
    let path = path.as_ref();
    tracing::info!("Loading agent definition from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    AgentDefinition::from_toml(&content)
}
