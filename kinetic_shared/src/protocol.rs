//! Wire protocol shared by the firmware emitter, the keymap exporter and the simulator.
//!
//! Every command is one ASCII line of the form `"<OPCODE> <component-name>"`
//! terminated by [`FRAME_TERMINATOR`]. The command table derived here from a
//! single [`PinAssignment`] is the only place command strings are built, so
//! the firmware dispatch table and the keymap descriptors cannot drift apart.

use crate::component::ComponentKind;
use crate::pins::{AssignedPins, Pin, PinAssignment};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte that ends every frame in both directions.
pub const FRAME_TERMINATOR: u8 = 0x0A;

pub const DEFAULT_ACCUMULATOR_SIZE: usize = 64;

pub const PWM_DUTY_MAX: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    MotorForward,
    MotorBackward,
    MotorSpeed,
    MotorBrakeHold,
    MotorBrakeRelease,
    VoltageSensorCollect,
    DistanceSensorCollect,
    SwitchOpen,
    SwitchClose,
    GenericCommand,
}

impl Opcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::MotorForward => "MOTOR_FORWARD",
            Opcode::MotorBackward => "MOTOR_BACKWARD",
            Opcode::MotorSpeed => "MOTOR_SPEED",
            Opcode::MotorBrakeHold => "MOTOR_BRAKE_HOLD",
            Opcode::MotorBrakeRelease => "MOTOR_BRAKE_RELEASE",
            Opcode::VoltageSensorCollect => "VOLTAGE_SENSOR_COLLECT",
            Opcode::DistanceSensorCollect => "VL53L0X_COLLECT",
            Opcode::SwitchOpen => "SWITCH_OPEN",
            Opcode::SwitchClose => "SWITCH_CLOSE",
            Opcode::GenericCommand => "GENERIC_COMMAND",
        }
    }

    /// Full command string for a component.
    pub fn command(&self, component: &str) -> String {
        format!("{} {}", self.as_str(), component)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical operation name used as a keymap key by the host-side wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Forwards,
    Backwards,
    Speed,
    Brake,
    Release,
    Collect,
    Open,
    Close,
    Command,
}

impl Operation {
    pub fn key(&self) -> &'static str {
        match self {
            Operation::Forwards => "FORWARDS",
            Operation::Backwards => "BACKWARDS",
            Operation::Speed => "SPEED",
            Operation::Brake => "BRAKE",
            Operation::Release => "RELEASE",
            Operation::Collect => "COLLECT",
            Operation::Open => "OPEN",
            Operation::Close => "CLOSE",
            Operation::Command => "COMMAND",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "LOW",
            Level::High => "HIGH",
        }
    }
}

/// Firmware-side effect of a matched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DigitalWrite { pin: Pin, level: Level },
    /// First phase of a two-phase speed command; the next line is the PWM duty.
    AwaitSpeed { pwm: Pin },
    ReadVoltage { pin: Pin },
    ReadDistance,
    /// Dispatch hook exists, behaviour is filled in by hand.
    Placeholder,
}

/// One row of the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub operation: Operation,
    pub opcode: Opcode,
    pub command: String,
    pub action: Action,
}

impl CommandEntry {
    fn new(name: &str, operation: Operation, opcode: Opcode, action: Action) -> Self {
        Self {
            operation,
            opcode,
            command: opcode.command(name),
            action,
        }
    }
}

/// Derive the ordered dispatch table of one component from its pin assignment.
///
/// Motors only get direction commands when they own a direction pin and a
/// speed command when they own a PWM pin.
pub fn command_table(assignment: &PinAssignment) -> Vec<CommandEntry> {
    let name = assignment.name();
    match (assignment.component.kind, assignment.pins) {
        (ComponentKind::Motor { .. }, AssignedPins::Motor { pwm, direction, brake }) => {
            let mut entries = Vec::with_capacity(5);
            if let Some(pin) = direction {
                entries.push(CommandEntry::new(
                    name,
                    Operation::Forwards,
                    Opcode::MotorForward,
                    Action::DigitalWrite { pin, level: Level::High },
                ));
                entries.push(CommandEntry::new(
                    name,
                    Operation::Backwards,
                    Opcode::MotorBackward,
                    Action::DigitalWrite { pin, level: Level::Low },
                ));
            }
            if let Some(pwm) = pwm {
                entries.push(CommandEntry::new(
                    name,
                    Operation::Speed,
                    Opcode::MotorSpeed,
                    Action::AwaitSpeed { pwm },
                ));
            }
            entries.push(CommandEntry::new(
                name,
                Operation::Brake,
                Opcode::MotorBrakeHold,
                Action::DigitalWrite { pin: brake, level: Level::High },
            ));
            entries.push(CommandEntry::new(
                name,
                Operation::Release,
                Opcode::MotorBrakeRelease,
                Action::DigitalWrite { pin: brake, level: Level::Low },
            ));
            entries
        }
        (ComponentKind::VoltageSensor, AssignedPins::VoltageSensor { collect }) => vec![CommandEntry::new(
            name,
            Operation::Collect,
            Opcode::VoltageSensorCollect,
            Action::ReadVoltage { pin: collect },
        )],
        (ComponentKind::Switch, AssignedPins::Switch { control }) => vec![
            CommandEntry::new(
                name,
                Operation::Open,
                Opcode::SwitchOpen,
                Action::DigitalWrite { pin: control, level: Level::Low },
            ),
            CommandEntry::new(
                name,
                Operation::Close,
                Opcode::SwitchClose,
                Action::DigitalWrite { pin: control, level: Level::High },
            ),
        ],
        (ComponentKind::DistanceSensor, _) => vec![CommandEntry::new(
            name,
            Operation::Collect,
            Opcode::DistanceSensorCollect,
            Action::ReadDistance,
        )],
        (ComponentKind::Generic { generate_ignore: false }, _) => vec![CommandEntry::new(
            name,
            Operation::Command,
            Opcode::GenericCommand,
            Action::Placeholder,
        )],
        _ => Vec::new(),
    }
}

/// Analog voltage-divider conversion baked into the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageDivider {
    #[serde(default = "default_reference_voltage")]
    pub reference_voltage: f64,
    #[serde(default = "default_adc_steps")]
    pub adc_steps: u32,
    /// R2 / (R1 + R2) of the divider in front of the analog pin.
    #[serde(default = "default_divider_ratio")]
    pub divider_ratio: f64,
    /// Decimal places in the reply.
    #[serde(default = "default_precision")]
    pub precision: u8,
}

impl VoltageDivider {
    /// Most decimals a reply may carry.
    pub const MAX_PRECISION: u8 = 6;

    pub fn convert(&self, raw: u16) -> f64 {
        ((raw as f64 * self.reference_voltage) / self.adc_steps as f64) / self.divider_ratio
    }

    pub fn format_reply(&self, raw: u16) -> String {
        format!("{:.*}", self.precision as usize, self.convert(raw))
    }

    /// Bytes needed to hold the widest reply, with room for a sign and the NUL.
    pub fn reply_capacity(&self) -> usize {
        let top = self.adc_steps.saturating_sub(1).min(u16::MAX as u32) as u16;
        format!("{:.*}", self.precision as usize, self.convert(top).abs()).len() + 2
    }
}

impl Default for VoltageDivider {
    fn default() -> Self {
        Self {
            reference_voltage: default_reference_voltage(),
            adc_steps: default_adc_steps(),
            divider_ratio: default_divider_ratio(),
            precision: default_precision(),
        }
    }
}

fn default_reference_voltage() -> f64 { 5.0 }
fn default_adc_steps() -> u32 { 1024 }
fn default_divider_ratio() -> f64 { 7.5 / 37.5 }
fn default_precision() -> u8 { 3 }

/// Ranging behaviour of distance sensors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceSensorConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
    /// Reply sent instead of a distance when the read times out.
    #[serde(default = "default_timeout_token")]
    pub timeout_token: String,
}

impl Default for DistanceSensorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            timeout_token: default_timeout_token(),
        }
    }
}

fn default_timeout_ms() -> u32 { 500 }
fn default_timeout_token() -> String { "TIMEOUT".to_string() }
