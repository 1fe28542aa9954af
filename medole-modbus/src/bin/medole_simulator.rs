use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::signal;

use medole_modbus::config::SimulatorConfig;
use medole_modbus::simulator;

/// Simulated Medole dehumidifier served over Modbus
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (default: 127.0.0.1)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Listen port (default: 5020)
    #[arg(long)]
    port: Option<u16>,

    /// Unit id of the register bank (default: 1)
    #[arg(long)]
    unit_id: Option<u8>,

    /// Period of the plant update in milliseconds (default: 5000)
    #[arg(long)]
    tick_period_ms: Option<u64>,

    /// Fan operation hours added per tick while the fan runs (default: 0.01)
    #[arg(long)]
    fan_hours_per_tick: Option<f64>,

    /// Seed of the plant noise
    #[arg(long)]
    seed: Option<u64>,

    /// Serve RTU on this serial port instead of Modbus-TCP
    #[cfg(feature = "serial")]
    #[arg(long)]
    serial: Option<String>,

    /// Baud rate of the serial port
    #[cfg(feature = "serial")]
    #[arg(long, default_value_t = medole_modbus::descriptor::DEFAULT_BAUD_RATE)]
    baud_rate: u32,
}

impl Args {
    /// Configuration file values overridden by the command line.
    fn simulator_config(&self) -> Result<SimulatorConfig> {
        let mut config = match &self.config {
            Some(path) => SimulatorConfig::from_file(path)?,
            None => SimulatorConfig::default(),
        };

        if self.host.is_some() || self.port.is_some() {
            let current = config.socket_addr()?;
            let addr = SocketAddr::new(
                self.host.unwrap_or(current.ip()),
                self.port.unwrap_or(current.port()),
            );
            config.listen = addr.to_string();
        }
        if let Some(unit_id) = self.unit_id {
            config.unit_id = unit_id;
        }
        if let Some(tick_period_ms) = self.tick_period_ms {
            config.tick_period_ms = tick_period_ms;
        }
        if let Some(fan_hours_per_tick) = self.fan_hours_per_tick {
            config.fan_hours_per_tick = fan_hours_per_tick;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let config = args.simulator_config()?;

    #[cfg(feature = "serial")]
    let handle = match &args.serial {
        Some(path) => {
            let mut settings = medole_modbus::descriptor::SerialSettings::new(path.as_str());
            settings.baud_rate = args.baud_rate;
            simulator::start_rtu(&config, &settings)
                .with_context(|| format!("failed to start simulator on {path}"))?
        }
        None => simulator::start_tcp(&config)
            .await
            .with_context(|| format!("failed to start simulator on {}", config.listen))?,
    };
    #[cfg(not(feature = "serial"))]
    let handle = simulator::start_tcp(&config)
        .await
        .with_context(|| format!("failed to start simulator on {}", config.listen))?;

    signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");
    handle.stop().await;

    Ok(())
}
