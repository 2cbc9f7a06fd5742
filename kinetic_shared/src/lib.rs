// kinetic_shared: data model shared by the generator, the host runtime and the simulator

pub mod component;
pub mod keymap;
pub mod pins;
pub mod protocol;

pub use component::{ComponentDeclaration, ComponentKind};
pub use keymap::KeymapDescriptor;
pub use pins::{AssignedPins, PhysicalPin, Pin, PinAssignment, PinCategory, PinPoolError, PinPools, PinRole};
pub use protocol::{
    command_table, Action, CommandEntry, DistanceSensorConfig, Level, Opcode, Operation, VoltageDivider, FRAME_TERMINATOR,
    PWM_DUTY_MAX,
};
