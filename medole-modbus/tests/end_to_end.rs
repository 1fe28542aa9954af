#![cfg(feature = "simulator")]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use medole_modbus::{
    catalog,
    codec::OperationStatus,
    config::{ClientSettings, SimulatorConfig},
    descriptor::ConnectionDescriptor,
    device::{Action, Command, Commander, Dehumidifier, FanSpeed, HumiditySetpoint, Poller},
    registry::{EndpointRegistry, LockScope},
    simulator::{spawn_tcp_simulator, start_tcp, wall_clock, SimulatedDehumidifier, Simulator},
    Error, ErrorKind,
};
use tokio::{net::TcpListener, task::JoinHandle};

struct Fixture {
    simulator: Simulator<SimulatedDehumidifier>,
    registry: EndpointRegistry,
    addr: SocketAddr,
    descriptor: ConnectionDescriptor,
    server: JoinHandle<()>,
}

impl Fixture {
    async fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let config = SimulatorConfig {
            listen: "127.0.0.1:0".to_string(),
            seed: Some(42),
            ..Default::default()
        };
        let device = SimulatedDehumidifier::new(&config, wall_clock()).unwrap();
        let simulator = Simulator::new(device);
        let (addr, server) = spawn_tcp_simulator(config.socket_addr().unwrap(), simulator.clone())
            .await
            .unwrap();

        Self {
            simulator,
            registry: EndpointRegistry::new(ClientSettings::default(), LockScope::PerEndpoint),
            addr,
            descriptor: ConnectionDescriptor::tcp(addr.ip().to_string(), addr.port(), 1),
            server,
        }
    }

    fn dehumidifier(&self) -> Dehumidifier {
        Dehumidifier::new(self.registry.resolve(&self.descriptor))
    }

    fn tick(&self) {
        self.simulator.tick(wall_clock());
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[tokio::test]
async fn refresh_reads_initial_state() {
    let fixture = Fixture::start().await;
    let readings = fixture.dehumidifier().refresh().await.unwrap();

    assert_eq!(readings.temperature_1, 25.5);
    assert_eq!(readings.temperature_2, 26.0);
    assert_eq!(readings.humidity_1, 60);
    assert_eq!(readings.humidity_2, 60);
    assert!(!readings.power);
    assert_eq!(readings.fan_speed, FanSpeed::Low);
    assert_eq!(readings.humidity_setpoint, HumiditySetpoint::Percent(50));
    assert_eq!(readings.fan_operation_hours, 100);
    assert_eq!(readings.fan_alarm_hours, 2400);
    assert_eq!(readings.action(), Action::Off);
}

#[tokio::test]
async fn dehumidifies_down_to_setpoint() {
    let fixture = Fixture::start().await;
    let device = fixture.dehumidifier();

    device.apply(Command::TurnOn).await.unwrap();
    device.apply(Command::SetHumidity(40)).await.unwrap();
    fixture.tick();

    let readings = device.refresh().await.unwrap();
    assert!(readings.power);
    assert!(readings.dehumidify_mode);
    assert!(!readings.purify_mode);
    assert!(readings.operation_status.compressor_on);
    assert!(readings.operation_status.fan_on);
    assert!(readings.humidity_1 < 60);
    assert_eq!(readings.target_humidity(), 40);
    assert_eq!(readings.action(), Action::Drying);
}

#[tokio::test]
async fn continuous_mode_runs_until_power_off() {
    let fixture = Fixture::start().await;
    let device = fixture.dehumidifier();

    device.apply(Command::TurnOn).await.unwrap();
    device.apply(Command::SetContinuous).await.unwrap();
    for _ in 0..5 {
        fixture.tick();
        let readings = device.refresh().await.unwrap();
        assert_eq!(readings.humidity_setpoint, HumiditySetpoint::Continuous);
        assert!(readings.operation_status.compressor_on);
    }

    device.apply(Command::TurnOff).await.unwrap();
    fixture.tick();
    let readings = device.refresh().await.unwrap();
    assert!(!readings.operation_status.compressor_on);
    assert!(!readings.operation_status.fan_on);
    assert_eq!(readings.action(), Action::Off);
}

#[tokio::test]
async fn fan_speed_reads_back() {
    let fixture = Fixture::start().await;
    let client = fixture.registry.resolve(&fixture.descriptor);

    client
        .write_register(catalog::FAN_SPEED.address, catalog::FAN_SPEED_HIGH)
        .await
        .unwrap();
    let word = client.read_register(catalog::FAN_SPEED.address).await.unwrap();
    assert_eq!(word, catalog::FAN_SPEED_HIGH);
}

#[tokio::test]
async fn read_only_register_rejects_writes() {
    let fixture = Fixture::start().await;
    let client = fixture.registry.resolve(&fixture.descriptor);

    let err = client
        .write_register(catalog::TEMPERATURE_1.address, 0x0A1E)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Exception(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Transaction);

    let word = client.read_register(catalog::TEMPERATURE_1.address).await.unwrap();
    assert_eq!(word, 0x0519);
}

#[tokio::test]
async fn unmapped_address_is_an_exception() {
    let fixture = Fixture::start().await;
    let client = fixture.registry.resolve(&fixture.descriptor);

    let err = client.read_registers(0x6300, 1).await.unwrap_err();
    assert!(matches!(err, Error::Exception(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_client_serves_concurrent_pollers() {
    let fixture = Arc::new(Fixture::start().await);
    assert!(fixture.registry.is_empty());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let fixture = fixture.clone();
            tokio::spawn(async move {
                let device = fixture.dehumidifier();
                for _ in 0..3 {
                    device.refresh().await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(fixture.registry.len(), 1);
}

#[tokio::test]
async fn other_unit_id_gets_no_answer() {
    let fixture = Fixture::start().await;
    let registry = EndpointRegistry::new(
        ClientSettings::with_timeout(Duration::from_millis(200)),
        LockScope::PerEndpoint,
    );
    let client = registry.resolve(&ConnectionDescriptor::tcp(
        fixture.addr.ip().to_string(),
        fixture.addr.port(),
        7,
    ));

    let err = client
        .read_register(catalog::FAN_SPEED.address)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Transaction);

    // The configured unit is still served.
    let word = fixture
        .registry
        .resolve(&fixture.descriptor)
        .read_register(catalog::FAN_SPEED.address)
        .await
        .unwrap();
    assert_eq!(word, catalog::FAN_SPEED_LOW);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_updates_keep_client_writes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SimulatorConfig {
        listen: "127.0.0.1:0".to_string(),
        tick_period_ms: 10,
        seed: Some(3),
        ..Default::default()
    };
    let handle = start_tcp(&config).await.unwrap();
    let addr = handle.local_addr().unwrap();

    let registry = EndpointRegistry::default();
    let descriptor = ConnectionDescriptor::tcp(addr.ip().to_string(), addr.port(), config.unit_id);
    let device = Dehumidifier::new(registry.resolve(&descriptor));
    let client = device.client().clone();

    assert!(!device.refresh().await.unwrap().operation_status.compressor_on);
    device.apply(Command::TurnOn).await.unwrap();
    device.apply(Command::SetContinuous).await.unwrap();

    // No manual ticks: only the update task can set the status bits.
    let mut drying = false;
    for i in 0..500u16 {
        let speed = i % 3 + 1;
        client
            .write_register(catalog::FAN_SPEED.address, speed)
            .await
            .unwrap();
        let read_back = client
            .read_register(catalog::FAN_SPEED.address)
            .await
            .unwrap();
        assert_eq!(read_back, speed);

        let status = OperationStatus::decode(
            client
                .read_register(catalog::OPERATION_STATUS.address)
                .await
                .unwrap(),
        );
        drying |= status.compressor_on && status.fan_on;
        if drying && i >= 30 {
            break;
        }
    }
    assert!(drying);

    let readings = device.refresh().await.unwrap();
    assert!(readings.power);
    assert!(readings.dehumidify_mode);
    assert_eq!(readings.humidity_setpoint, HumiditySetpoint::Continuous);
    assert_eq!(readings.action(), Action::Drying);
    assert_eq!(handle.simulator().snapshot().registers().power, 1);

    handle.stop().await;
    let err = client
        .read_register(catalog::POWER.address)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn silent_device_times_out() {
    // Accepted by the kernel but never answered.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = EndpointRegistry::new(
        ClientSettings::with_timeout(Duration::from_millis(200)),
        LockScope::PerEndpoint,
    );
    let client = registry.resolve(&ConnectionDescriptor::tcp("127.0.0.1", addr.port(), 1));

    let err = client
        .read_register(catalog::HUMIDITY_1.address)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Transaction);
    drop(listener);
}

#[tokio::test]
async fn closed_port_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let registry = EndpointRegistry::default();
    let client = registry.resolve(&ConnectionDescriptor::tcp("127.0.0.1", port, 1));

    let err = client.read_register(catalog::POWER.address).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
