/// RTU dehumidifier client on a serial line
use anyhow::Result;
use clap::Parser;
use medole_modbus::{
    config::ClientSettings,
    descriptor::{ConnectionDescriptor, SerialSettings, DEFAULT_BAUD_RATE},
    device::{Dehumidifier, Poller},
    registry::EndpointRegistry,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "/dev/ttyUSB0")]
    path: String,
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud_rate: u32,
    #[arg(long, default_value_t = 1)]
    unit: u8,
    #[arg(long, default_value_t = 1)]
    polls: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let mut settings = SerialSettings::new(args.path);
    settings.baud_rate = args.baud_rate;
    let descriptor = ConnectionDescriptor::serial(settings, args.unit);
    descriptor.validate()?;

    let registry = EndpointRegistry::new(ClientSettings::default(), Default::default());
    let device = Dehumidifier::new(registry.resolve(&descriptor));

    for _ in 0..args.polls {
        let readings = device.refresh().await?;
        println!("{readings}");
        println!("{}", readings.status_summary());
    }

    Ok(())
}
