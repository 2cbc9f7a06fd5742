// src/hardware/devices.rs - Component wrappers driven by generated keymaps
use super::{ChainCall, CommandLink, TransportError};
use kinetic_shared::{KeymapDescriptor, Operation, PWM_DUTY_MAX};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("keymap has no '{0}' command")]
    MissingKey(String),
    #[error("unreadable reply '{0}'")]
    InvalidReading(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("keymap JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn command(keymap: &KeymapDescriptor, operation: Operation) -> Result<&str, DeviceError> {
    keymap
        .get(operation)
        .ok_or_else(|| DeviceError::MissingKey(operation.key().to_string()))
}

/// PWM duty for a control value, `round(255 * |control|)`.
pub fn duty_for(control: f64) -> u8 {
    (f64::from(PWM_DUTY_MAX) * control.abs().min(1.0)).round() as u8
}

/// DC motor with optional speed and direction control.
///
/// Capabilities follow the keymap: no `SPEED` key means no PWM, no
/// `FORWARDS`/`BACKWARDS` keys means no direction pin.
pub struct Motor {
    link: Arc<dyn CommandLink>,
    keymap: KeymapDescriptor,
    control: f64,
}

impl Motor {
    pub fn new(link: Arc<dyn CommandLink>, keymap: KeymapDescriptor) -> Self {
        Self {
            link,
            keymap,
            control: 0.0,
        }
    }

    /// Last committed control value.
    pub fn control(&self) -> f64 {
        self.control
    }

    pub fn has_speed_control(&self) -> bool {
        self.keymap.get(Operation::Speed).is_some()
    }

    pub fn has_direction_control(&self) -> bool {
        self.keymap.get(Operation::Forwards).is_some() && self.keymap.get(Operation::Backwards).is_some()
    }

    /// Drive the motor. `control` is clamped to -1..=1; positive is forwards
    /// and 0 holds the brake.
    pub async fn set_control(&mut self, control: f64) -> Result<(), DeviceError> {
        let control = if control.is_nan() { 0.0 } else { control.clamp(-1.0, 1.0) };
        self.control = control;

        if control == 0.0 {
            self.link.send(command(&self.keymap, Operation::Brake)?).await?;
            return Ok(());
        }

        if let Some(speed) = self.keymap.get(Operation::Speed) {
            let duty = duty_for(control);
            tracing::debug!("Motor speed {} -> duty {}", control, duty);
            self.link.send_chained(speed, ChainCall::Send(duty.to_string())).await?;
        }

        if self.has_direction_control() {
            let operation = if control > 0.0 {
                Operation::Forwards
            } else {
                Operation::Backwards
            };
            self.link.send(command(&self.keymap, operation)?).await?;
        } else if let Some(forwards) = self.keymap.get(Operation::Forwards) {
            self.link.send(forwards).await?;
        }

        self.link.send(command(&self.keymap, Operation::Release)?).await?;
        Ok(())
    }

    pub async fn forward(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.set_control(speed.abs()).await
    }

    /// Without a direction pin this runs the motor the only way it can.
    pub async fn backward(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.set_control(-speed.abs()).await
    }

    pub async fn stop(&mut self) -> Result<(), DeviceError> {
        self.set_control(0.0).await
    }
}

/// Left and right motors of a differential drive train.
///
/// Without direction control every manoeuvre drives both motors forwards.
pub struct DualMotor {
    left: Motor,
    right: Motor,
}

impl DualMotor {
    pub fn new(left: Motor, right: Motor) -> Self {
        Self { left, right }
    }

    pub fn left(&self) -> &Motor {
        &self.left
    }

    pub fn right(&self) -> &Motor {
        &self.right
    }

    pub async fn forward(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.left.forward(speed).await?;
        self.right.forward(speed).await
    }

    pub async fn backward(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.left.backward(speed).await?;
        self.right.backward(speed).await
    }

    /// Spin in place to the right.
    pub async fn clockwise(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.left.forward(speed).await?;
        self.right.backward(speed).await
    }

    /// Spin in place to the left.
    pub async fn counterclockwise(&mut self, speed: f64) -> Result<(), DeviceError> {
        self.left.backward(speed).await?;
        self.right.forward(speed).await
    }

    pub async fn stop(&mut self) -> Result<(), DeviceError> {
        self.left.stop().await?;
        self.right.stop().await
    }
}

/// Relay, transistor or MOSFET on one digital pin.
pub struct Switch {
    link: Arc<dyn CommandLink>,
    keymap: KeymapDescriptor,
}

impl Switch {
    pub fn new(link: Arc<dyn CommandLink>, keymap: KeymapDescriptor) -> Self {
        Self { link, keymap }
    }

    /// Stop current flowing.
    pub async fn open(&self) -> Result<(), DeviceError> {
        self.link.send(command(&self.keymap, Operation::Open)?).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), DeviceError> {
        self.link.send(command(&self.keymap, Operation::Close)?).await?;
        Ok(())
    }
}

pub struct VoltageSensor {
    link: Arc<dyn CommandLink>,
    keymap: KeymapDescriptor,
}

impl VoltageSensor {
    pub fn new(link: Arc<dyn CommandLink>, keymap: KeymapDescriptor) -> Self {
        Self { link, keymap }
    }

    /// Voltage in volts as converted on the board.
    pub async fn collect(&self) -> Result<f64, DeviceError> {
        let reply = collect(self.link.as_ref(), &self.keymap).await?;
        reply
            .trim()
            .parse::<f64>()
            .map_err(|_| DeviceError::InvalidReading(reply))
    }
}

pub struct DistanceSensor {
    link: Arc<dyn CommandLink>,
    keymap: KeymapDescriptor,
    timeout_token: String,
}

impl DistanceSensor {
    pub fn new(link: Arc<dyn CommandLink>, keymap: KeymapDescriptor) -> Self {
        Self::with_timeout_token(link, keymap, "TIMEOUT")
    }

    pub fn with_timeout_token(link: Arc<dyn CommandLink>, keymap: KeymapDescriptor, token: impl Into<String>) -> Self {
        Self {
            link,
            keymap,
            timeout_token: token.into(),
        }
    }

    /// Range in millimetres, `None` when the sensor timed out.
    pub async fn collect(&self) -> Result<Option<u32>, DeviceError> {
        let reply = collect(self.link.as_ref(), &self.keymap).await?;
        let reply = reply.trim();
        if reply == self.timeout_token {
            tracing::debug!("Distance sensor timed out");
            return Ok(None);
        }
        reply
            .parse::<u32>()
            .map(Some)
            .map_err(|_| DeviceError::InvalidReading(reply.to_string()))
    }
}

async fn collect(link: &dyn CommandLink, keymap: &KeymapDescriptor) -> Result<String, DeviceError> {
    let reply = link
        .send_chained(command(keymap, Operation::Collect)?, ChainCall::Receive)
        .await?;
    reply.ok_or_else(|| DeviceError::InvalidReading(String::new()))
}
