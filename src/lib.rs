// src/lib.rs - kinetic-rs: serial endpoint generator and host runtime
pub mod agent;
pub mod config;
pub mod generate;
pub mod hardware;

pub use kinetic_shared as shared;

pub use agent::{load_agent, AgentDefinition, AgentError, ComponentEntry, ComponentRegistry};
pub use config::{load_config, Config, ConfigError};
pub use generate::{Artifacts, GenerateError, Generator};
pub use hardware::{load_keymap, CommandLink, DeviceError, SerialTransport, TransportError};
