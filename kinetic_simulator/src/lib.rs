//! Virtual microcontroller running the generated serial endpoint's dispatch loop.
//!
//! The board is built from the same pin assignments the firmware emitter
//! consumes and reacts to incoming bytes exactly as the emitted `loop()` and
//! `dispatchCommand()` do, so host-side code can be exercised without hardware.

pub mod board;

pub use board::{SpeedState, VirtualBoard};
