use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ringlog_kernel::access::SharedLog;
use ringlog_kernel::adapters::device::{CharDevice, DeviceHandle, SeekTo, Whence};
use ringlog_kernel::adapters::socket::Server;
use ringlog_kernel::config::RingConfig;

/// Ringlog CLI
#[derive(Parser, Debug)]
#[command(name = "ringlog")]
#[command(about = "Fixed-capacity log of the most recent commands", long_about = None)]
struct Cli {
    /// Path to config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Number of commands to retain (overrides config)
    #[arg(long, global = true)]
    capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the log over TCP
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Drop bytes that follow a terminator instead of keeping them
        #[arg(long)]
        drop_remainder: bool,

        /// Append a timestamp command every N seconds
        #[arg(long)]
        timestamp_interval: Option<u64>,
    },

    /// Write a file through the device front end and print what is retained
    Replay {
        /// File whose contents are written to the device
        input: PathBuf,

        /// Seek to COMMAND,OFFSET before reading
        #[arg(long, value_parser = parse_seek)]
        seek: Option<SeekTo>,

        /// Size of each write to the device
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },
}

/// JSON output of `replay`
#[derive(Debug, Serialize)]
struct ReplayOutput {
    capacity: usize,
    total_size: usize,
    commands: Vec<String>,
    cursor: usize,
    tail: String,
}

fn parse_seek(arg: &str) -> Result<SeekTo, String> {
    let (cmd, offset) = arg
        .split_once(',')
        .ok_or_else(|| format!("expected COMMAND,OFFSET, got `{arg}`"))?;

    Ok(SeekTo {
        write_cmd: cmd.trim().parse().map_err(|e| format!("bad command index: {e}"))?,
        write_cmd_offset: offset.trim().parse().map_err(|e| format!("bad offset: {e}"))?,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ----------------------------
    // Load config
    // ----------------------------
    let mut config = match &cli.config {
        Some(path) => RingConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RingConfig::default_config(),
    };
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }

    match cli.command {
        Command::Serve {
            bind,
            port,
            drop_remainder,
            timestamp_interval,
        } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if drop_remainder {
                config.server.carry_over_remainder = false;
            }
            if timestamp_interval.is_some() {
                config.server.timestamp_interval_secs = timestamp_interval;
            }
            config.validate()?;

            serve(config)
        }
        Command::Replay {
            input,
            seek,
            chunk_size,
        } => {
            config.validate()?;
            anyhow::ensure!(chunk_size > 0, "chunk size must be at least 1");

            let output = replay(&config, &input, seek, chunk_size)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn serve(config: RingConfig) -> Result<()> {
    let log = Arc::new(SharedLog::with_capacity(config.capacity)?);
    let server = Server::bind(config.server.clone(), Arc::clone(&log))
        .with_context(|| format!("binding {}", config.server.socket_addr()))?;

    info!(capacity = log.capacity(), "serving command log");
    server.run()?;
    Ok(())
}

fn replay(
    config: &RingConfig,
    input: &Path,
    seek: Option<SeekTo>,
    chunk_size: usize,
) -> Result<ReplayOutput> {
    let log = Arc::new(SharedLog::with_capacity(config.capacity)?);
    let device = CharDevice::new(log);

    // ----------------------------
    // Write input through the device
    // ----------------------------
    let mut file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut writer = device.open();
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        writer.write_all(&chunk[..n])?;
    }

    // ----------------------------
    // Read back
    // ----------------------------
    let mut reader = device.open();
    let commands = read_commands(&mut reader)?;
    let total_size = reader.position();

    if let Some(target) = seek {
        reader.seek_to(target)?;
    } else {
        reader.llseek(0, Whence::Set)?;
    }
    let cursor = reader.position();

    let mut tail = Vec::new();
    reader.read_to_end(&mut tail)?;

    Ok(ReplayOutput {
        capacity: config.capacity,
        total_size,
        commands,
        cursor,
        tail: String::from_utf8_lossy(&tail).into_owned(),
    })
}

/// Read the whole log one command at a time.
fn read_commands(reader: &mut DeviceHandle) -> Result<Vec<String>> {
    let mut commands = Vec::new();
    let mut buf = vec![0u8; 4096];
    let mut current = Vec::new();

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        current.extend_from_slice(&buf[..n]);
        if current.last() == Some(&b'\n') {
            commands.push(String::from_utf8_lossy(&current).into_owned());
            current.clear();
        }
    }
    if !current.is_empty() {
        commands.push(String::from_utf8_lossy(&current).into_owned());
    }

    Ok(commands)
}
