//! # hitecd-capture
//!
//! Decode traffic sniffed from a Hitec D-series servo line and log it.
//!
//! Reads UART-decoded bytes from a logic analyzer export or, when
//! `capture.port` is set, live from a serial adapter with RX inversion
//! enabled. Every decoded transaction is logged and written to rotating
//! JSONL files under `capture.log_dir`.
//!
//! # Usage
//!
//! ```bash
//! hitecd-capture [config.toml]
//! ```
//!
//! Expected output:
//! ```text
//! INFO hitecd_capture: hitecd-capture v0.1.0 starting...
//! INFO hitecd_servo::capture::logger: Logging capture to ./logs/capture_20240101_120000_0001.jsonl
//! INFO hitecd_capture: write FACTORY_RESET=0x0F0F=3855
//! INFO hitecd_capture: read MODEL_NUMBER=0x01E5=485
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hitecd_servo::capture::logger::CaptureLogger;
use hitecd_servo::capture::{Transaction, TrafficDecoder};
use hitecd_servo::config::{CaptureConfig, Config};

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Read buffer size for live capture
const READ_CHUNK_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("hitecd-capture v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref())?;

    let mut decoder = TrafficDecoder::new();
    let mut logger = CaptureLogger::new(&config.capture.log_dir, config.capture.max_records_per_file)
        .with_context(|| format!("Failed to create log directory {}", config.capture.log_dir))?;

    if !config.capture.port.is_empty() {
        capture_serial(&config.capture, &mut decoder, &mut logger).await?;
    } else if !config.capture.input.is_empty() {
        capture_file(Path::new(&config.capture.input), &mut decoder, &mut logger).await?;
    } else {
        bail!("No capture source: set capture.input or capture.port");
    }

    let stats = decoder.stats();
    info!(
        "Decoded {} reads, {} writes; {} errors, {} checksum failures",
        stats.reads, stats.writes, stats.errors, stats.checksum_failures
    );

    Ok(())
}

/// Load the configuration, falling back to defaults when the default file is
/// absent
fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load configuration from {}", path))
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH)),
        None => {
            warn!("{} not found, using defaults", DEFAULT_CONFIG_PATH);
            Ok(Config::default())
        }
    }
}

/// Log and record decoded transactions
fn record(transactions: Vec<Transaction>, logger: &mut CaptureLogger) -> Result<()> {
    for transaction in transactions {
        match &transaction {
            Transaction::Error { .. } => warn!("{}", transaction),
            _ => info!("{}", transaction),
        }
        logger.log(&transaction)?;
    }
    Ok(())
}

/// Decode a whole capture file
async fn capture_file(
    path: &Path,
    decoder: &mut TrafficDecoder,
    logger: &mut CaptureLogger,
) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read capture file {}", path.display()))?;
    info!("Decoding {} bytes from {}", data.len(), path.display());

    record(decoder.push(&data), logger)?;
    record(decoder.finish(), logger)?;
    logger.flush()?;
    Ok(())
}

/// Decode live traffic until Ctrl+C
async fn capture_serial(
    config: &CaptureConfig,
    decoder: &mut TrafficDecoder,
    logger: &mut CaptureLogger,
) -> Result<()> {
    let mut port = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .with_context(|| format!("Failed to open {}", config.port))?;

    info!("Sniffing {} at {} baud", config.port, config.baud_rate);
    info!("Press Ctrl+C to exit");

    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.clear();
        tokio::select! {
            read = port.read_buf(&mut buf) => {
                let n = read.context("Serial read failed")?;
                if n == 0 {
                    info!("Serial port closed");
                    break;
                }
                record(decoder.push(&buf), logger)?;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    record(decoder.finish(), logger)?;
    logger.flush()?;
    Ok(())
}
