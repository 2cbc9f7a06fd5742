//! # Generator and Serial Configuration
//!
//! One TOML file drives both endpoint generation and the host-side serial link.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [paths]
//! agent = "testbot.toml"
//! output = "endpoint"
//!
//! [board]
//! target = "mega"
//!
//! [firmware]
//! baud = 9600
//! accumulator_size = 64
//!
//! [firmware.voltage]
//! divider_ratio = 0.2
//! precision = 2
//!
//! [firmware.distance]
//! timeout_ms = 500
//!
//! [serial]
//! port = "/dev/ttyACM0"
//! timeout_ms = 5000
//! ```
//!
//! Relative paths under `[paths]` are resolved against the directory holding the config file.

use kinetic_shared::protocol::DEFAULT_ACCUMULATOR_SIZE;
use kinetic_shared::{DistanceSensorConfig, PinCategory, PinPoolError, PinPools, VoltageDivider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub firmware: FirmwareConfig,
    #[serde(default)]
    pub serial: SerialConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Agent definition file.
    #[serde(default = "default_agent_path")]
    pub agent: PathBuf,
    /// Directory receiving the firmware source and keymaps.
    #[serde(default = "default_output_path")]
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            agent: default_agent_path(),
            output: default_output_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardTarget {
    #[default]
    Mega,
    Uno,
}

/// Microcontroller target. Explicit pin lists replace the target's built-in pool of that category.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub target: BoardTarget,
    #[serde(default)]
    pub pwm_pins: Option<Vec<u8>>,
    #[serde(default)]
    pub digital_pins: Option<Vec<u8>>,
    #[serde(default)]
    pub analog_pins: Option<Vec<u8>>,
}

impl BoardConfig {
    pub fn pools(&self) -> Result<PinPools, PinPoolError> {
        let builtin = match self.target {
            BoardTarget::Mega => PinPools::arduino_mega(),
            BoardTarget::Uno => PinPools::arduino_uno(),
        };
        if self.pwm_pins.is_none() && self.digital_pins.is_none() && self.analog_pins.is_none() {
            return Ok(builtin);
        }
        let pick = |explicit: &Option<Vec<u8>>, category: PinCategory| {
            explicit
                .clone()
                .unwrap_or_else(|| builtin.pool(category).to_vec())
        };
        PinPools::new(
            pick(&self.pwm_pins, PinCategory::Pwm),
            pick(&self.digital_pins, PinCategory::Digital),
            pick(&self.analog_pins, PinCategory::Analog),
        )
    }
}

/// Constants baked into the emitted firmware.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirmwareConfig {
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_accumulator_size")]
    pub accumulator_size: usize,
    #[serde(default)]
    pub voltage: VoltageDivider,
    #[serde(default)]
    pub distance: DistanceSensorConfig,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            accumulator_size: default_accumulator_size(),
            voltage: VoltageDivider::default(),
            distance: DistanceSensorConfig::default(),
        }
    }
}

/// Host side of the serial link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud: default_baud(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl FirmwareConfig {
    /// Reject values that would not fit the emitted C source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accumulator_size == 0 {
            return Err(ConfigError::Invalid("firmware.accumulator_size must be at least 1".into()));
        }
        if self.baud == 0 {
            return Err(ConfigError::Invalid("firmware.baud must be non-zero".into()));
        }
        let voltage = &self.voltage;
        if voltage.adc_steps == 0 || voltage.adc_steps > u16::MAX as u32 + 1 {
            return Err(ConfigError::Invalid(
                "firmware.voltage.adc_steps must be between 1 and 65536".into(),
            ));
        }
        if !(voltage.divider_ratio.is_finite() && voltage.divider_ratio > 0.0)
            || !(voltage.reference_voltage.is_finite() && voltage.reference_voltage > 0.0)
        {
            return Err(ConfigError::Invalid(
                "firmware.voltage needs a positive reference_voltage and divider_ratio".into(),
            ));
        }
        if voltage.precision > VoltageDivider::MAX_PRECISION {
            return Err(ConfigError::Invalid(format!(
                "firmware.voltage.precision must be at most {}",
                VoltageDivider::MAX_PRECISION
            )));
        }
        // emitted inside a C string literal and compared against on the host
        let token = &self.distance.timeout_token;
        if token.is_empty()
            || token.bytes().any(|b| !b.is_ascii_graphic() || b == b'"' || b == b'\\')
            || token.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(format!(
                "firmware.distance.timeout_token {:?} must be printable ASCII without spaces, quotes or backslashes, and not a number",
                token
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.firmware.validate()?;
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial.baud must be non-zero".into()));
        }
        if self.firmware.baud != self.serial.baud {
            tracing::warn!(
                "Firmware baud {} differs from host serial baud {}",
                self.firmware.baud,
                self.serial.baud
            );
        }
        self.board
            .pools()
            .map_err(|e| ConfigError::Invalid(format!("board pins: {}", e)))?;
        Ok(())
    }

    /// Resolve relative `[paths]` entries against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.paths.agent.is_relative() {
            self.paths.agent = base.join(&self.paths.agent);
        }
        if self.paths.output.is_relative() {
            self.paths.output = base.join(&self.paths.output);
        }
    }
}

fn default_agent_path() -> PathBuf {
    PathBuf::from("agent.toml")
}

fn default_output_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_baud() -> u32 {
    9600
}

fn default_accumulator_size() -> usize {
    DEFAULT_ACCUMULATOR_SIZE
}

fn default_serial_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}
