// Integration tests for the serial transport over in-memory streams

use kinetic_rs::agent::{AgentDefinition, ComponentEntry};
use kinetic_rs::config::FirmwareConfig;
use kinetic_rs::generate::Generator;
use kinetic_rs::hardware::{ChainCall, CommandLink, DistanceSensor, Motor, SerialTransport, Switch, TransportError, VoltageSensor};
use kinetic_rs::shared::{Level, PinPools};
use kinetic_simulator::VirtualBoard;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(2);

/// Serve a virtual board on the far end of a duplex stream until the host hangs up.
fn spawn_board(mut board: VirtualBoard, mut stream: DuplexStream) -> JoinHandle<VirtualBoard> {
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            board.feed_bytes(&buf[..n]);
            let reply = board.take_output();
            if !reply.is_empty() && stream.write_all(&reply).await.is_err() {
                break;
            }
        }
        board
    })
}

/// Collect every line the host writes until it hangs up.
fn spawn_recorder(stream: DuplexStream) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line);
        }
        seen
    })
}

#[tokio::test]
async fn frames_arrive_intact_in_both_directions() {
    let (host, mut peer) = tokio::io::duplex(256);
    let transport = SerialTransport::new(host, TIMEOUT);

    transport.send("SWITCH_CLOSE S1").await.unwrap();
    let mut frame = vec![0u8; 16];
    peer.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame, b"SWITCH_CLOSE S1\n");

    peer.write_all(b"812\nTIMEOUT\n").await.unwrap();
    assert_eq!(transport.receive().await.unwrap(), "812");
    assert_eq!(transport.receive().await.unwrap(), "TIMEOUT");

    let stats = transport.get_stats().await;
    assert_eq!(stats.messages_sent, 1);
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.bytes_received, 12);
}

#[tokio::test]
async fn concurrent_chains_never_interleave() {
    let (host, peer) = tokio::io::duplex(64);
    let transport = Arc::new(SerialTransport::new(host, TIMEOUT));
    let recorder = spawn_recorder(peer);

    let mut tasks = Vec::new();
    for (motor, duty) in [("A", "100"), ("B", "200"), ("C", "50")] {
        let transport = transport.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                transport
                    .send_chained(&format!("MOTOR_SPEED {}", motor), ChainCall::Send(duty.to_string()))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    drop(transport);

    let lines = recorder.await.unwrap();
    assert_eq!(lines.len(), 150);
    for pair in lines.chunks(2) {
        let expected = match pair[0].as_str() {
            "MOTOR_SPEED A" => "100",
            "MOTOR_SPEED B" => "200",
            "MOTOR_SPEED C" => "50",
            other => panic!("unexpected primary line {}", other),
        };
        assert_eq!(pair[1], expected);
    }
}

#[tokio::test]
async fn invalid_chain_call_sends_nothing_and_releases_the_stream() {
    let (host, peer) = tokio::io::duplex(256);
    let transport = SerialTransport::new(host, TIMEOUT);
    let recorder = spawn_recorder(peer);

    let result = transport.send_chained_by_name("MOTOR_SPEED M1", "TELEPORT", None).await;
    assert!(matches!(result, Err(TransportError::InvalidChainCall(name)) if name == "TELEPORT"));

    let next = tokio::time::timeout(Duration::from_millis(500), transport.send("MOTOR_BRAKE_HOLD M1")).await;
    assert!(next.expect("lock still held").is_ok());
    drop(transport);

    assert_eq!(recorder.await.unwrap(), ["MOTOR_BRAKE_HOLD M1"]);
}

#[tokio::test]
async fn invalid_chain_call_leaves_motor_ready_for_commands() {
    let agent = AgentDefinition::new("rover").with(ComponentEntry::motor("M1", true, true));
    let artifacts = Generator::new(PinPools::arduino_mega(), FirmwareConfig::default())
        .unwrap()
        .render(&agent)
        .unwrap();
    let (host, peer) = tokio::io::duplex(256);
    let server = spawn_board(VirtualBoard::new(&artifacts.assignments), peer);
    let transport = SerialTransport::new(host, TIMEOUT);

    let result = transport.send_chained_by_name("MOTOR_SPEED M1", "TELEPORT", Some("200")).await;
    assert!(matches!(result, Err(TransportError::InvalidChainCall(_))));
    transport.send("MOTOR_BRAKE_HOLD M1").await.unwrap();
    drop(transport);

    let board = server.await.unwrap();
    assert_eq!(board.digital_level(5), Some(Level::High));
    assert_eq!(board.pwm_duty(3), None);
    assert_eq!(board.speed_state("M1"), Some(kinetic_simulator::SpeedState::Idle));
}

#[tokio::test]
async fn timed_out_receive_keeps_partial_line() {
    let (host, mut peer) = tokio::io::duplex(256);
    let transport = SerialTransport::new(host, Duration::from_millis(50));

    peer.write_all(b"12.").await.unwrap();
    assert!(matches!(transport.receive().await, Err(TransportError::Timeout(_))));
    assert_eq!(transport.get_stats().await.timeouts, 1);

    peer.write_all(b"5\n").await.unwrap();
    assert_eq!(transport.receive().await.unwrap(), "12.5");
}

#[tokio::test]
async fn closed_peer_fails_reads_and_writes() {
    let (host, peer) = tokio::io::duplex(256);
    let transport = SerialTransport::new(host, TIMEOUT);
    drop(peer);

    assert!(matches!(transport.receive().await, Err(TransportError::Closed)));
    assert!(matches!(transport.send("SWITCH_OPEN S1").await, Err(TransportError::Io(_))));
    assert_eq!(transport.get_stats().await.errors, 2);
}

#[tokio::test]
async fn devices_drive_a_virtual_board() {
    let agent = AgentDefinition::new("rover")
        .with(ComponentEntry::motor("M1", true, true))
        .with(ComponentEntry::switch("S1"))
        .with(ComponentEntry::voltage_sensor("Battery"))
        .with(ComponentEntry::distance_sensor("Front"));
    let artifacts = Generator::new(PinPools::arduino_mega(), FirmwareConfig::default())
        .unwrap()
        .render(&agent)
        .unwrap();
    let keymap = |name: &str| {
        artifacts
            .keymaps
            .iter()
            .find(|k| k.component == name)
            .unwrap()
            .descriptor
            .clone()
    };

    let mut board = VirtualBoard::new(&artifacts.assignments);
    board.set_analog_input(0, 768);
    board.set_range("Front", Some(431));

    let (host, peer) = tokio::io::duplex(256);
    let server = spawn_board(board, peer);
    let link: Arc<dyn CommandLink> = Arc::new(SerialTransport::new(host, TIMEOUT));

    let mut motor = Motor::new(link.clone(), keymap("M1"));
    let switch = Switch::new(link.clone(), keymap("S1"));
    let battery = VoltageSensor::new(link.clone(), keymap("Battery"));
    let front = DistanceSensor::new(link.clone(), keymap("Front"));

    motor.set_control(-0.5).await.unwrap();
    switch.close().await.unwrap();
    assert_eq!(battery.collect().await.unwrap(), 18.75);
    assert_eq!(front.collect().await.unwrap(), Some(431));

    drop((motor, switch, battery, front, link));
    let board = server.await.unwrap();

    assert_eq!(board.pwm_duty(3), Some(128));
    assert_eq!(board.digital_level(4), Some(Level::Low));
    assert_eq!(board.digital_level(5), Some(Level::Low));
    assert_eq!(board.digital_level(6), Some(Level::High));
    assert_eq!(board.unmatched_count(), 0);
}
