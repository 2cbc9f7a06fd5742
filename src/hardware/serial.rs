// src/hardware/serial.rs - Line-framed serial transport to the generated endpoint
use kinetic_shared::protocol::FRAME_TERMINATOR;
use serial2_tokio::SerialPort;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid chain call '{0}', expected SEND or RECEIVE")]
    InvalidChainCall(String),
    #[error("chained SEND needs a message")]
    MissingChainParameter,
    #[error("serial stream failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no complete line within {0:?}")]
    Timeout(Duration),
    #[error("serial stream closed by remote")]
    Closed,
}

/// Follow-up operation executed under the same lock as the primary one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    Send(String),
    Receive,
}

impl ChainCall {
    /// Resolve a follow-up by name (`SEND` / `RECEIVE`, case-insensitive).
    pub fn parse(name: &str, parameter: Option<&str>) -> Result<Self, TransportError> {
        match name.to_ascii_uppercase().as_str() {
            "SEND" => parameter
                .map(|message| ChainCall::Send(message.to_string()))
                .ok_or(TransportError::MissingChainParameter),
            "RECEIVE" => Ok(ChainCall::Receive),
            _ => Err(TransportError::InvalidChainCall(name.to_string())),
        }
    }
}

impl FromStr for ChainCall {
    type Err = TransportError;

    /// `RECEIVE`, or `SEND <message>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, parameter) = match s.split_once(' ') {
            Some((name, rest)) => (name, Some(rest)),
            None => (s, None),
        };
        Self::parse(name, parameter)
    }
}

/// Serial transfer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub replaced_chars: u64,
    pub errors: u64,
    pub timeouts: u64,
}

struct Link<S> {
    stream: BufReader<S>,
    /// Bytes of a line whose read timed out, kept for the next receive.
    partial: Vec<u8>,
}

/// Encode one outgoing frame. Non-ASCII characters and embedded newlines become `?`.
pub fn encode_frame(message: &str) -> (Vec<u8>, usize) {
    let mut frame = Vec::with_capacity(message.len() + 1);
    let mut replaced = 0;
    for c in message.chars() {
        if c.is_ascii() && c != '\n' {
            frame.push(c as u8);
        } else {
            frame.push(b'?');
            replaced += 1;
        }
    }
    frame.push(FRAME_TERMINATOR);
    (frame, replaced)
}

/// Exclusive, line-framed access to one byte stream.
///
/// Every public operation, chained or not, holds the stream lock from its
/// first byte to its last and releases it on every return path.
pub struct SerialTransport<S> {
    link: Mutex<Link<S>>,
    stats: Mutex<SerialStats>,
    read_timeout: Duration,
}

impl SerialTransport<SerialPort> {
    /// Open a serial device.
    pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, TransportError> {
        tracing::info!("Opening serial port {} at {} baud", port_name, baud_rate);
        let port = SerialPort::open(port_name, baud_rate)?;
        Ok(Self::new(port, read_timeout))
    }
}

impl<S> SerialTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            link: Mutex::new(Link {
                stream: BufReader::new(stream),
                partial: Vec::new(),
            }),
            stats: Mutex::new(SerialStats::default()),
            read_timeout,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Send one message.
    pub async fn send(&self, message: &str) -> Result<(), TransportError> {
        let mut link = self.link.lock().await;
        self.write_frame(&mut link, message).await
    }

    /// Receive one message, without its terminator.
    pub async fn receive(&self) -> Result<String, TransportError> {
        let mut link = self.link.lock().await;
        self.read_frame(&mut link).await
    }

    /// Send `message`, then run `follow_up` before anyone else may use the stream.
    ///
    /// Returns the follow-up's reply when it is a receive.
    pub async fn send_chained(&self, message: &str, follow_up: ChainCall) -> Result<Option<String>, TransportError> {
        let mut link = self.link.lock().await;
        self.write_frame(&mut link, message).await?;
        self.follow_up(&mut link, follow_up).await
    }

    /// Receive one message, then run `follow_up` under the same lock.
    pub async fn receive_chained(&self, follow_up: ChainCall) -> Result<(String, Option<String>), TransportError> {
        let mut link = self.link.lock().await;
        let reply = self.read_frame(&mut link).await?;
        let follow = self.follow_up(&mut link, follow_up).await?;
        Ok((reply, follow))
    }

    /// Chained send with the follow-up given by name. An unknown name fails
    /// with [`TransportError::InvalidChainCall`] before anything is written,
    /// so the endpoint never sees a primary line without its follow-up.
    pub async fn send_chained_by_name(
        &self,
        message: &str,
        chain_call: &str,
        parameter: Option<&str>,
    ) -> Result<Option<String>, TransportError> {
        let follow_up = ChainCall::parse(chain_call, parameter)?;
        self.send_chained(message, follow_up).await
    }

    pub async fn get_stats(&self) -> SerialStats {
        self.stats.lock().await.clone()
    }

    pub async fn reset_stats(&self) {
        *self.stats.lock().await = SerialStats::default();
    }

    async fn follow_up(&self, link: &mut Link<S>, follow_up: ChainCall) -> Result<Option<String>, TransportError> {
        match follow_up {
            ChainCall::Send(message) => {
                self.write_frame(link, &message).await?;
                Ok(None)
            }
            ChainCall::Receive => Ok(Some(self.read_frame(link).await?)),
        }
    }

    async fn write_frame(&self, link: &mut Link<S>, message: &str) -> Result<(), TransportError> {
        let (frame, replaced) = encode_frame(message);
        if replaced > 0 {
            tracing::warn!("Replaced {} unsendable characters in {:?}", replaced, message);
        }
        tracing::debug!("Serial TX: {}", message);

        let write = async {
            link.stream.write_all(&frame).await?;
            link.stream.flush().await
        };
        let result = timeout(self.read_timeout, write).await;
        match result {
            Ok(Ok(())) => {
                let mut stats = self.stats.lock().await;
                stats.messages_sent += 1;
                stats.bytes_sent += frame.len() as u64;
                stats.replaced_chars += replaced as u64;
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!("Serial write error: {}", e);
                self.stats.lock().await.errors += 1;
                Err(TransportError::Io(e))
            }
            Err(_) => {
                tracing::warn!("Serial write timed out after {:?}", self.read_timeout);
                self.stats.lock().await.timeouts += 1;
                Err(TransportError::Timeout(self.read_timeout))
            }
        }
    }

    async fn read_frame(&self, link: &mut Link<S>) -> Result<String, TransportError> {
        let result = timeout(
            self.read_timeout,
            link.stream.read_until(FRAME_TERMINATOR, &mut link.partial),
        )
        .await;
        let partial = &mut link.partial;
        match result {
            Ok(Ok(0)) if partial.is_empty() => {
                tracing::info!("Serial connection closed by remote");
                self.stats.lock().await.errors += 1;
                Err(TransportError::Closed)
            }
            Ok(Ok(_)) => {
                let mut line = std::mem::take(partial);
                if line.last() == Some(&FRAME_TERMINATOR) {
                    line.pop();
                } else {
                    tracing::warn!("Stream ended inside a frame, delivering {} bytes", line.len());
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                tracing::debug!("Serial RX: {}", text);
                let mut stats = self.stats.lock().await;
                stats.messages_received += 1;
                stats.bytes_received += line.len() as u64 + 1;
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::error!("Serial read error: {}", e);
                self.stats.lock().await.errors += 1;
                Err(TransportError::Io(e))
            }
            Err(_) => {
                tracing::warn!("Timeout after {:?} waiting for response", self.read_timeout);
                self.stats.lock().await.timeouts += 1;
                Err(TransportError::Timeout(self.read_timeout))
            }
        }
    }
}

impl<S> std::fmt::Debug for SerialTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn frames_are_ascii_with_one_terminator() {
        assert_eq!(encode_frame("MOTOR_SPEED M1"), (b"MOTOR_SPEED M1\n".to_vec(), 0));
        assert_eq!(encode_frame("caf\u{e9}"), (b"caf?\n".to_vec(), 1));
        assert_eq!(encode_frame("a\nb"), (b"a?b\n".to_vec(), 1));
        assert_eq!(encode_frame(""), (b"\n".to_vec(), 0));
    }

    #[test]
    fn chain_calls_parse_by_name() {
        assert_eq!(ChainCall::parse("receive", None).unwrap(), ChainCall::Receive);
        assert_eq!(
            ChainCall::parse("SEND", Some("200")).unwrap(),
            ChainCall::Send("200".to_string())
        );
        assert!(matches!(
            ChainCall::parse("SEND", None),
            Err(TransportError::MissingChainParameter)
        ));
        assert!(matches!(
            ChainCall::parse("JUMP", None),
            Err(TransportError::InvalidChainCall(name)) if name == "JUMP"
        ));
        assert_eq!("SEND 128".parse::<ChainCall>().unwrap(), ChainCall::Send("128".into()));
    }

    #[tokio::test]
    async fn send_writes_message_and_newline() {
        let mock = Builder::new().write(b"SWITCH_OPEN Relay\n").build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        transport.send("SWITCH_OPEN Relay").await.unwrap();
        let stats = transport.get_stats().await;
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 18);
    }

    #[tokio::test]
    async fn receive_strips_terminator_and_decodes_lossily() {
        let mock = Builder::new().read(b"12.5").read(b"00\n").read(b"\xffok\n").build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        assert_eq!(transport.receive().await.unwrap(), "12.500");
        assert_eq!(transport.receive().await.unwrap(), "\u{fffd}ok");
    }

    #[tokio::test]
    async fn chained_speed_sends_both_lines() {
        let mock = Builder::new()
            .write(b"MOTOR_SPEED M1\n")
            .write(b"200\n")
            .build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        let reply = transport
            .send_chained("MOTOR_SPEED M1", ChainCall::Send("200".into()))
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn chained_collect_returns_reply() {
        let mock = Builder::new()
            .write(b"VOLTAGE_SENSOR_COLLECT Battery\n")
            .read(b"11.942\n")
            .build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        let reply = transport
            .send_chained("VOLTAGE_SENSOR_COLLECT Battery", ChainCall::Receive)
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("11.942"));
    }

    #[tokio::test]
    async fn read_error_is_reported_and_lock_released() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .write(b"MOTOR_BRAKE_HOLD M1\n")
            .build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        assert!(matches!(transport.receive().await, Err(TransportError::Io(_))));
        transport.send("MOTOR_BRAKE_HOLD M1").await.unwrap();
        assert_eq!(transport.get_stats().await.errors, 1);
    }

    #[tokio::test]
    async fn invalid_chain_name_writes_nothing() {
        let mock = Builder::new().write(b"MOTOR_BRAKE_HOLD M1\n").build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        let result = transport
            .send_chained_by_name("MOTOR_SPEED M1", "JUMP", Some("200"))
            .await;
        assert!(matches!(result, Err(TransportError::InvalidChainCall(_))));
        transport.send("MOTOR_BRAKE_HOLD M1").await.unwrap();
        assert_eq!(transport.get_stats().await.messages_sent, 1);
    }

    #[tokio::test]
    async fn chain_by_name_sends_both_lines() {
        let mock = Builder::new()
            .write(b"MOTOR_SPEED M1\n")
            .write(b"77\n")
            .build();
        let transport = SerialTransport::new(mock, Duration::from_secs(1));
        let reply = transport
            .send_chained_by_name("MOTOR_SPEED M1", "send", Some("77"))
            .await
            .unwrap();
        assert_eq!(reply, None);
    }
}
