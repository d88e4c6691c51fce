//! `probelink`: talk to a serial-console device from the terminal.
//!
//! ```text
//! probelink ports
//! probelink probe --port /dev/ttyUSB0
//! probelink monitor --port /dev/ttyUSB0 --auto-baud --json
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides `--log-level`); device output
//! goes to stdout.

mod output;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use probelink_core::{ConnectionState, EngineConfig};
use probelink_engine::{Delivery, LinkEngine, Subscription};
use probelink_protocol::RawCommand;
use probelink_transport::{NativeOpener, list_ports};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::output::{Renderer, blob_path};

/// Serial-link console for ESP32-class firmware
#[derive(Parser, Debug)]
#[command(name = "probelink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Frame, group and decode a device's serial console", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,

    /// Detect the baud rate a device answers at
    Probe {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Connect and stream the console; stdin lines are sent as commands
    Monitor {
        #[command(flatten)]
        link: LinkArgs,

        /// Baud rate (defaults to the first probe candidate)
        #[arg(short, long, conflicts_with = "auto_baud")]
        baud: Option<u32>,

        /// Detect the baud rate before connecting
        #[arg(long)]
        auto_baud: bool,

        /// Save binary transfers into this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Serial port (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long)]
    port: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device shell prompt to strip from lines
    #[arg(long)]
    prompt: Option<String>,

    /// Idle time before an open record is flushed (ms)
    #[arg(long)]
    idle_flush_ms: Option<u64>,

    /// DTR level after connecting
    #[arg(long)]
    dtr: Option<bool>,

    /// RTS level after connecting
    #[arg(long)]
    rts: Option<bool>,
}

impl LinkArgs {
    /// Load the configuration file, if any, then apply flag overrides.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(prompt) = &self.prompt {
            config.framing.prompt = Some(prompt.clone());
        }
        if let Some(ms) = self.idle_flush_ms {
            config.aggregation.idle_flush_ms = ms;
        }
        if let Some(dtr) = self.dtr {
            config.link.dtr = dtr;
        }
        if let Some(rts) = self.rts {
            config.link.rts = rts;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let renderer = Renderer { json: cli.json };
    match cli.command {
        Command::Ports => {
            let ports = list_ports().context("Failed to list serial ports")?;
            println!("{}", renderer.ports(&ports));
        }
        Command::Probe { link } => {
            let engine = LinkEngine::new(NativeOpener::new(), link.engine_config()?)?;
            let outcome = engine.probe_baud_rate(&link.port).await?;
            println!("{}", renderer.probe(&outcome));
        }
        Command::Monitor {
            link,
            baud,
            auto_baud,
            save_dir,
        } => monitor(link, baud, auto_baud, save_dir, renderer).await?,
    }
    Ok(())
}

fn setup_logging(level: &str) {
    let log_level = level.parse::<Level>().unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn monitor(
    link: LinkArgs,
    baud: Option<u32>,
    auto_baud: bool,
    save_dir: Option<PathBuf>,
    renderer: Renderer,
) -> Result<()> {
    let config = link.engine_config()?;
    let fallback = config.probe.fallback_rate();
    let engine = LinkEngine::new(NativeOpener::new(), config)?;

    if let Some(dir) = &save_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // Subscribe before connecting so nothing printed on connect is missed.
    let printers = [
        tokio::spawn(print_lines(engine.subscribe_lines(), renderer)),
        tokio::spawn(print_records(engine.subscribe_records(), renderer)),
        tokio::spawn(print_binaries(engine.subscribe_binaries(), renderer, save_dir)),
    ];

    if auto_baud {
        let outcome = engine.connect_auto(&link.port).await?;
        if !outcome.detected {
            warn!(baud_rate = outcome.baud_rate, "Baud rate not detected, using fallback");
        }
    } else {
        engine
            .connect(&link.port, baud.unwrap_or(fallback))
            .await
            .with_context(|| format!("Failed to connect to {}", link.port))?;
    }

    let result = session(&engine).await;

    engine.disconnect().await;
    for printer in printers {
        printer.abort();
    }
    let stats = engine.stats();
    info!(
        bytes = stats.bytes_read,
        lines = stats.lines,
        records = stats.records,
        binaries = stats.binaries,
        commands = stats.commands_sent,
        "Session ended"
    );
    result
}

/// Forward stdin to the device until Ctrl-C or the link fails.
async fn session(engine: &LinkEngine<NativeOpener>) -> Result<()> {
    let mut state = engine.watch_state();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Error {
                    bail!("Link failed");
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if !engine.send_command(&RawCommand::new(line)).await {
                            warn!("Command was not sent");
                        }
                    }
                    None => stdin_open = false,
                }
            }
        }
    }
}

async fn print_lines(mut lines: Subscription<String>, renderer: Renderer) {
    while let Some(delivery) = lines.recv().await {
        match delivery {
            Delivery::Item(line) => println!("{}", renderer.line(&line)),
            Delivery::Missed(n) => println!("{}", renderer.missed("line", n)),
        }
    }
}

async fn print_records(
    mut records: Subscription<std::sync::Arc<probelink_engine::ResponseEnvelope>>,
    renderer: Renderer,
) {
    while let Some(delivery) = records.recv().await {
        match delivery {
            Delivery::Item(envelope) => {
                if let Some(out) = renderer.record(&envelope) {
                    println!("{out}");
                }
            }
            Delivery::Missed(n) => println!("{}", renderer.missed("record", n)),
        }
    }
}

async fn print_binaries(
    mut binaries: Subscription<bytes::Bytes>,
    renderer: Renderer,
    save_dir: Option<PathBuf>,
) {
    let mut seq = 0u64;
    while let Some(delivery) = binaries.recv().await {
        let blob = match delivery {
            Delivery::Item(blob) => blob,
            Delivery::Missed(n) => {
                println!("{}", renderer.missed("binary", n));
                continue;
            }
        };

        seq += 1;
        let saved = match &save_dir {
            Some(dir) => {
                let path = blob_path(dir, chrono::Utc::now(), seq);
                match tokio::fs::write(&path, &blob).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to save transfer");
                        None
                    }
                }
            }
            None => None,
        };
        println!("{}", renderer.binary(&blob, saved.as_deref()));
    }
}
