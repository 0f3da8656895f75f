//! GPIB bus probe.
//!
//! Connects to a Prologix GPIB-Ethernet controller, reports its firmware
//! version, and scans a range of primary addresses with `*IDN?` to find
//! which instruments answer.
//!
//! Do not run a scan during an active experiment: every probed address is
//! re-addressed on the bus, and some instruments react to being addressed
//! even without a command. Run it once at setup time.

use anyhow::{Context, Result};
use clap::Parser;
use prologix_gpib::{ControllerConfig, GpibError, PrimaryAddress, PrologixController};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gpib_probe",
    about = "Scan a Prologix GPIB-Ethernet bus for instruments"
)]
struct Args {
    /// Controller hostname or IP address.
    host: String,

    /// Controller TCP port.
    #[arg(long, default_value_t = prologix_gpib::DEFAULT_PORT)]
    port: u16,

    /// First address to probe.
    #[arg(long, default_value_t = 1)]
    first: u8,

    /// Last address to probe.
    #[arg(long, default_value_t = PrimaryAddress::MAX)]
    last: u8,

    /// Per-address response window in milliseconds.
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = ControllerConfig::new(&args.host);
    config.port = args.port;
    config.default_read_timeout = Duration::from_millis(args.timeout_ms);
    config.validate().map_err(anyhow::Error::msg)?;

    let controller = PrologixController::connect(&config)
        .await
        .with_context(|| format!("connecting to {}:{}", args.host, args.port))?;

    println!("Controller: {}", controller.version().await?);

    let mut found = 0usize;
    for addr in args.first..=args.last.min(PrimaryAddress::MAX) {
        let handle = controller.instrument(addr)?;
        match handle.query("*IDN?").await {
            Ok(idn) => {
                found += 1;
                println!("  {addr:>2}: {idn}");
            }
            Err(GpibError::Timeout(_)) => println!("  {addr:>2}: no response"),
            Err(err) => {
                return Err(err).with_context(|| format!("probing address {addr}"));
            }
        }
    }

    println!("{found} instrument(s) answered");
    controller.close().await?;
    Ok(())
}
