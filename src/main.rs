// src/main.rs - kinetic command line: generate endpoints, talk to them
use clap::{Parser, Subcommand};
use kinetic_rs::config::{self, Config, SerialConfig};
use kinetic_rs::generate;
use kinetic_rs::hardware::{ChainCall, SerialTransport};
use std::path::PathBuf;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Parser)]
#[command(name = "kinetic", version, about = "Serial endpoint generator and host link for robot agents")]
struct Cli {
    /// Log every allocation and serial line
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate firmware and keymaps for the agent named in a config file
    Generate {
        #[arg(default_value = "kinetic.toml")]
        config: PathBuf,
    },
    /// Send one command line to a connected endpoint
    Send {
        message: String,
        /// Wait for one reply line
        #[arg(short, long)]
        receive: bool,
        /// Serial settings are read from here unless overridden
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<String>,
        #[arg(short, long)]
        baud: Option<u32>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let result = match cli.command {
        Command::Generate { config } => run_generate(config),
        Command::Send {
            message,
            receive,
            config,
            port,
            baud,
            timeout_ms,
        } => run_send(message, receive, config, port, baud, timeout_ms).await,
    };

    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    result
}

fn run_generate(config_path: PathBuf) -> Result<(), BoxError> {
    tracing::info!("Loading configuration from: {}", config_path.display());
    let config = config::load_config(&config_path)?;
    tracing::info!("Board: {:?}, agent file: {}", config.board.target, config.paths.agent.display());

    let artifacts = generate::run(&config)?;
    println!("Agent '{}'", artifacts.agent);
    for assignment in &artifacts.assignments {
        println!("  {}", assignment);
    }
    println!(
        "Wrote {} and {} keymaps to {}",
        generate::FIRMWARE_FILE_NAME,
        artifacts.keymaps.len(),
        config.paths.output.display()
    );
    Ok(())
}

async fn run_send(
    message: String,
    receive: bool,
    config_path: Option<PathBuf>,
    port: Option<String>,
    baud: Option<u32>,
    timeout_ms: Option<u64>,
) -> Result<(), BoxError> {
    let serial = match config_path {
        Some(path) => config::load_config(path)?.serial,
        None => Config::default().serial,
    };
    let (port, baud, timeout) = link_settings(serial, port, baud, timeout_ms);

    let transport = SerialTransport::open(&port, baud, timeout)?;
    if receive {
        let reply = transport.send_chained(&message, ChainCall::Receive).await?;
        println!("{}", reply.unwrap_or_default());
    } else {
        transport.send(&message).await?;
    }

    let stats = transport.get_stats().await;
    tracing::debug!("Serial stats: {:?}", stats);
    Ok(())
}

/// Command line values win over the `[serial]` section.
fn link_settings(
    serial: SerialConfig,
    port: Option<String>,
    baud: Option<u32>,
    timeout_ms: Option<u64>,
) -> (String, u32, Duration) {
    let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(serial.timeout());
    let baud = baud.unwrap_or(serial.baud);
    let port = port.unwrap_or(serial.port);
    (port, baud, timeout)
}
