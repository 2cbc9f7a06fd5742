// src/hardware/mod.rs - Host-side runtime for the generated serial endpoint
pub mod devices;
pub mod serial;

pub use devices::{DeviceError, DistanceSensor, DualMotor, Motor, Switch, VoltageSensor};
pub use serial::{ChainCall, SerialStats, SerialTransport, TransportError};

use async_trait::async_trait;
use kinetic_shared::KeymapDescriptor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

/// Message channel the component wrappers talk through.
#[async_trait]
pub trait CommandLink: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), TransportError>;
    async fn receive(&self) -> Result<String, TransportError>;
    /// Send `message` and run `follow_up` as one uninterrupted exchange.
    async fn send_chained(&self, message: &str, follow_up: ChainCall) -> Result<Option<String>, TransportError>;
}

#[async_trait]
impl<S> CommandLink for SerialTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: &str) -> Result<(), TransportError> {
        SerialTransport::send(self, message).await
    }

    async fn receive(&self) -> Result<String, TransportError> {
        SerialTransport::receive(self).await
    }

    async fn send_chained(&self, message: &str, follow_up: ChainCall) -> Result<Option<String>, TransportError> {
        SerialTransport::send_chained(self, message, follow_up).await
    }
}

/// Read a keymap JSON file written by the generator.
pub async fn load_keymap(path: impl AsRef<Path>) -> Result<KeymapDescriptor, DeviceError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let keymap: KeymapDescriptor = serde_json::from_str(&content)?;
    tracing::debug!("Loaded keymap {} ({} commands)", path.display(), keymap.len());
    Ok(keymap)
}
