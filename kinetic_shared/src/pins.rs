//! Pin pools, pin categories and per-component pin assignments.

use crate::component::ComponentDeclaration;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Electrical role a pool of pins is reserved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinCategory {
    Pwm,
    Digital,
    Analog,
}

impl PinCategory {
    pub const ALL: [PinCategory; 3] = [PinCategory::Pwm, PinCategory::Digital, PinCategory::Analog];
}

impl fmt::Display for PinCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinCategory::Pwm => "PWM",
            PinCategory::Digital => "DIGITAL",
            PinCategory::Analog => "ANALOG",
        })
    }
}

/// A pin drawn from one of the pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin {
    pub category: PinCategory,
    pub number: u8,
}

/// Physical header position of a pin. PWM and digital pins share the digital
/// header numbering, analog inputs have their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhysicalPin {
    Digital(u8),
    Analog(u8),
}

impl Pin {
    pub fn new(category: PinCategory, number: u8) -> Self {
        Self { category, number }
    }

    pub fn physical(&self) -> PhysicalPin {
        match self.category {
            PinCategory::Pwm | PinCategory::Digital => PhysicalPin::Digital(self.number),
            PinCategory::Analog => PhysicalPin::Analog(self.number),
        }
    }

    /// Identifier as written in firmware source. Analog inputs use the `A<n>` aliases.
    pub fn firmware_name(&self) -> String {
        match self.category {
            PinCategory::Analog => format!("A{}", self.number),
            _ => self.number.to_string(),
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.firmware_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinPoolError {
    #[error("pin {0} appears in more than one pool")]
    Overlapping(u8),
    #[error("pin {pin} is listed twice in the {category} pool")]
    Duplicate { category: PinCategory, pin: u8 },
}

/// The three disjoint, ordered pin pools of a microcontroller target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPools {
    pwm: Vec<u8>,
    digital: Vec<u8>,
    analog: Vec<u8>,
}

impl PinPools {
    /// Build pools, rejecting duplicates and any pin shared between the PWM and digital pools.
    pub fn new(pwm: Vec<u8>, digital: Vec<u8>, analog: Vec<u8>) -> Result<Self, PinPoolError> {
        for (category, pool) in [
            (PinCategory::Pwm, &pwm),
            (PinCategory::Digital, &digital),
            (PinCategory::Analog, &analog),
        ] {
            let mut seen = HashSet::new();
            for &pin in pool.iter() {
                if !seen.insert(pin) {
                    return Err(PinPoolError::Duplicate { category, pin });
                }
            }
        }
        if let Some(&pin) = pwm.iter().find(|pin| digital.contains(pin)) {
            return Err(PinPoolError::Overlapping(pin));
        }
        Ok(Self { pwm, digital, analog })
    }

    /// Arduino Mega 2560. Pins 0 and 1 carry the serial link; 4, 5, 6 and 13 are
    /// PWM-capable but run at 980 Hz, so they are handed out as plain digital pins.
    pub fn arduino_mega() -> Self {
        let pwm = vec![3, 9, 10, 11, 2, 7, 8, 12, 44, 45, 46];
        let digital = [4, 5, 6]
            .into_iter()
            .chain(13..=43)
            .chain(47..=53)
            .collect();
        let analog = (0..=15).collect();
        Self { pwm, digital, analog }
    }

    /// Arduino Uno / Nano.
    pub fn arduino_uno() -> Self {
        Self {
            pwm: vec![3, 9, 10, 11],
            digital: vec![2, 4, 5, 6, 7, 8, 12, 13],
            analog: (0..=5).collect(),
        }
    }

    pub fn pool(&self, category: PinCategory) -> &[u8] {
        match category {
            PinCategory::Pwm => &self.pwm,
            PinCategory::Digital => &self.digital,
            PinCategory::Analog => &self.analog,
        }
    }
}

impl Default for PinPools {
    fn default() -> Self {
        Self::arduino_mega()
    }
}

/// Role a granted pin plays for its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinRole {
    Pwm,
    Dir,
    Brake,
    Collect,
    Control,
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinRole::Pwm => "PWM",
            PinRole::Dir => "DIR",
            PinRole::Brake => "BRAKE",
            PinRole::Collect => "COLLECT",
            PinRole::Control => "CONTROL",
        })
    }
}

/// Pins granted to one component, shaped by its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignedPins {
    Motor {
        pwm: Option<Pin>,
        direction: Option<Pin>,
        brake: Pin,
    },
    VoltageSensor {
        collect: Pin,
    },
    Switch {
        control: Pin,
    },
    /// Distance sensors and generic components talk over command strings only.
    Unassigned,
}

impl AssignedPins {
    pub fn roles(&self) -> Vec<(PinRole, Pin)> {
        match *self {
            AssignedPins::Motor { pwm, direction, brake } => {
                let mut roles = Vec::with_capacity(3);
                if let Some(pin) = pwm {
                    roles.push((PinRole::Pwm, pin));
                }
                if let Some(pin) = direction {
                    roles.push((PinRole::Dir, pin));
                }
                roles.push((PinRole::Brake, brake));
                roles
            }
            AssignedPins::VoltageSensor { collect } => vec![(PinRole::Collect, collect)],
            AssignedPins::Switch { control } => vec![(PinRole::Control, control)],
            AssignedPins::Unassigned => Vec::new(),
        }
    }
}

/// Allocation result for one component. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinAssignment {
    pub component: ComponentDeclaration,
    pub pins: AssignedPins,
}

impl PinAssignment {
    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn pin(&self, role: PinRole) -> Option<Pin> {
        self.pins
            .roles()
            .into_iter()
            .find(|(r, _)| *r == role)
            .map(|(_, pin)| pin)
    }
}

/// One-line summary, e.g. `M1 [motor (pwm=true, direction=true)] PWM=3 DIR=4 BRAKE=5`.
impl fmt::Display for PinAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name(), self.component.kind)?;
        if self.pins == AssignedPins::Unassigned {
            return f.write_str(" no pins");
        }
        for (role, pin) in self.pins.roles() {
            write!(f, " {}={}", role, pin.firmware_name())?;
        }
        Ok(())
    }
}
