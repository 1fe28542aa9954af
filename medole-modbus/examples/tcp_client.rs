/// Modbus-TCP dehumidifier client
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use medole_modbus::{
    config::ClientSettings,
    descriptor::ConnectionDescriptor,
    device::{Command, Commander, Dehumidifier, Poller},
    registry::{EndpointRegistry, LockScope},
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 5020)]
    port: u16,
    #[arg(long, default_value_t = 1)]
    unit: u8,
    /// Number of polls, 0 polls forever
    #[arg(long, default_value_t = 0)]
    polls: u32,
    /// Poll period in milliseconds
    #[arg(long, default_value_t = 1000)]
    period_ms: u64,
    /// Turn the device on with this humidity setpoint before polling
    #[arg(long)]
    humidity: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let registry = EndpointRegistry::new(ClientSettings::default(), LockScope::PerEndpoint);
    let descriptor = ConnectionDescriptor::tcp(args.host, args.port, args.unit);
    let device = Dehumidifier::new(registry.resolve(&descriptor));

    if let Some(humidity) = args.humidity {
        device.apply(Command::TurnOn).await?;
        device.apply(Command::SetHumidity(humidity)).await?;
        info!("Turned on with setpoint {humidity} %");
    }

    let mut interval = tokio::time::interval(Duration::from_millis(args.period_ms));
    let mut polls = 0;
    while args.polls == 0 || polls < args.polls {
        interval.tick().await;
        match device.refresh().await {
            Ok(readings) => println!("{readings}"),
            Err(err) => warn!("Poll failed ({:?}): {err}", err.kind()),
        }
        polls += 1;
    }

    Ok(())
}
