//! Component identities and capability kinds.

use std::fmt;

/// Capability kind of a declared component, carrying the flags relevant to that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Motor {
        pwm_enabled: bool,
        direction_enabled: bool,
    },
    DistanceSensor,
    VoltageSensor,
    Switch,
    Generic {
        /// Skip command generation for this component entirely.
        generate_ignore: bool,
    },
}

impl ComponentKind {
    /// Short lowercase label, used as the keymap file prefix.
    pub fn label(&self) -> &'static str {
        match self {
            ComponentKind::Motor { .. } => "motor",
            ComponentKind::DistanceSensor => "vl53l0x",
            ComponentKind::VoltageSensor => "voltage_sensor",
            ComponentKind::Switch => "switch",
            ComponentKind::Generic { .. } => "generic",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Motor { pwm_enabled, direction_enabled } => write!(
                f,
                "motor (pwm={}, direction={})",
                pwm_enabled, direction_enabled
            ),
            other => f.write_str(other.label()),
        }
    }
}

/// A hardware component discovered in an agent definition.
///
/// The name is unique within one agent and is embedded verbatim in every
/// command string generated for the component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentDeclaration {
    pub name: String,
    pub kind: ComponentKind,
}

impl ComponentDeclaration {
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}
