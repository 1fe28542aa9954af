//! Simulated Medole dehumidifier.
//!
//! The plant keeps continuous humidity, temperature and fan hour values; the
//! registers show them at register resolution. Control registers are written
//! by clients and take effect on the next tick.

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};
use log::{info, warn};
use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
use rand_distr::{Distribution, Uniform};
use tokio_modbus::{ExceptionCode, Request, Response, SlaveId};

use super::{
    spawn_state_updates, spawn_tcp_simulator, DataStore, Device, Simulator, SimulatorError,
    SimulatorHandle,
};
use crate::catalog::{CONTINUOUS_DEHUMIDIFICATION, FAN_SPEED_LOW, MAX_HUMIDITY, MIN_HUMIDITY};
use crate::codec::{ClockTime, CodecError, OperationStatus, Temperature};
use crate::config::SimulatorConfig;
use crate::device::DehumidifierRegisters;

/// Continuous plant variables behind the sensor registers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plant {
    /// Relative humidity of both sensors, %.
    pub humidity: [f64; 2],
    /// Temperature of both sensors, °C.
    pub temperature: [f32; 2],
    pub fan_operation_hours: f64,
}

impl Default for Plant {
    fn default() -> Self {
        Self {
            humidity: [60.0, 60.0],
            temperature: [25.5, 26.0],
            fan_operation_hours: 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedDehumidifier {
    registers: DehumidifierRegisters,
    store: DataStore<DehumidifierRegisters>,
    plant: Plant,
    rng: ChaCha8Rng,
    unit_id: SlaveId,
    fan_hours_per_tick: f64,
}

impl SimulatedDehumidifier {
    pub fn new(config: &SimulatorConfig, now: NaiveDateTime) -> Result<Self, CodecError> {
        let seed = config
            .seed
            .unwrap_or_else(|| Utc::now().timestamp_micros() as u64);
        info!("Dehumidifier simulator seed {seed}");

        let plant = Plant::default();
        let mut registers = DehumidifierRegisters {
            temperature_1: Temperature::new(25, 5)?,
            humidity_1: 60,
            temperature_2: Temperature::new(26, 0)?,
            humidity_2: 60,
            operation_status: OperationStatus {
                fan_on: true,
                ..Default::default()
            },
            pipe_temperature: 150,
            fan_operation_hours: 100,
            fan_alarm_hours: 2400,
            power: 0,
            fan_speed: FAN_SPEED_LOW,
            humidity_setpoint: 50,
            dehumidify_mode: 0,
            purify_mode: 0,
            timer_function: 0,
            ..Default::default()
        };
        set_clock(&mut registers, now);
        let store = DataStore::new(&registers)?;

        Ok(Self {
            registers,
            store,
            plant,
            rng: ChaCha8Rng::seed_from_u64(seed),
            unit_id: config.unit_id,
            fan_hours_per_tick: config.fan_hours_per_tick,
        })
    }

    pub fn registers(&self) -> &DehumidifierRegisters {
        &self.registers
    }

    pub fn plant(&self) -> &Plant {
        &self.plant
    }

    pub fn unit_id(&self) -> SlaveId {
        self.unit_id
    }

    /// Replace the plant state; the sensor registers follow on the next tick.
    pub fn set_plant(&mut self, plant: Plant) {
        self.plant = plant;
    }

    fn update_humidity(&mut self, compressor_on: bool) {
        let drying = Uniform::new_inclusive(0.1, 1.0);
        let rising = Uniform::new_inclusive(0.0, 0.5);
        for humidity in &mut self.plant.humidity {
            let delta = if compressor_on {
                -drying.sample(&mut self.rng)
            } else {
                rising.sample(&mut self.rng)
            };
            *humidity = (*humidity + delta).clamp(f64::from(MIN_HUMIDITY), f64::from(MAX_HUMIDITY));
        }
        self.registers.humidity_1 = self.plant.humidity[0].floor() as u16;
        self.registers.humidity_2 = self.plant.humidity[1].floor() as u16;
    }

    fn update_temperature(&mut self) {
        let drift = Uniform::new_inclusive(-0.2f32, 0.2f32);
        for (i, temperature) in self.plant.temperature.iter_mut().enumerate() {
            *temperature += drift.sample(&mut self.rng);
            let register = match i {
                0 => &mut self.registers.temperature_1,
                _ => &mut self.registers.temperature_2,
            };
            match Temperature::from_celsius(*temperature) {
                Ok(value) => *register = value,
                Err(err) => warn!("Keeping temperature {} register at {register}: {err}", i + 1),
            }
        }
    }

    fn update_fan_hours(&mut self) {
        self.plant.fan_operation_hours += self.fan_hours_per_tick;
        let hours = self.plant.fan_operation_hours.floor().min(f64::from(u16::MAX)) as u16;
        self.registers.fan_operation_hours = self.registers.fan_operation_hours.max(hours);
    }
}

impl Device for SimulatedDehumidifier {
    type HoldingRegisters = DehumidifierRegisters;
    type Input = NaiveDateTime;

    fn unit_id(&self) -> SlaveId {
        self.unit_id
    }

    fn service_call(&mut self, req: Request<'_>) -> Result<Response, ExceptionCode> {
        self.store.service_call(&mut self.registers, req)
    }

    fn update_state(&mut self, now: NaiveDateTime) {
        let registers = &self.registers;
        let power = registers.power == 1;
        let compressor_on = power
            && registers.dehumidify_mode == 1
            && (registers.humidity_setpoint == CONTINUOUS_DEHUMIDIFICATION
                || registers.humidity_1 > registers.humidity_setpoint);
        let fan_on = power;

        self.registers.operation_status.compressor_on = compressor_on;
        self.registers.operation_status.fan_on = fan_on;

        self.update_humidity(compressor_on);
        self.update_temperature();
        if fan_on {
            self.update_fan_hours();
        }
        set_clock(&mut self.registers, now);

        if let Err(err) = self.store.sync(&self.registers) {
            warn!("Register bank not updated: {err}");
        }
    }
}

fn set_clock(registers: &mut DehumidifierRegisters, now: NaiveDateTime) {
    if let Ok(time) = ClockTime::new(now.hour() as u8, now.minute() as u8) {
        registers.current_time = time;
    }
    registers.current_seconds = now.second() as u16;
    registers.current_weekday = now.weekday().number_from_sunday() as u16;
}

/// Local wall clock, the input of every tick.
pub fn wall_clock() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Serve a dehumidifier over Modbus-TCP and tick it on the configured period.
pub async fn start_tcp(
    config: &SimulatorConfig,
) -> Result<SimulatorHandle<SimulatedDehumidifier>, SimulatorError> {
    let socket_addr = config.socket_addr()?;
    let simulator = Simulator::new(SimulatedDehumidifier::new(config, wall_clock())?);
    let (local_addr, server) = spawn_tcp_simulator(socket_addr, simulator.clone()).await?;
    info!(
        "Dehumidifier unit {} on {local_addr}, tick every {:?}",
        config.unit_id,
        config.tick_period()
    );
    let updates = spawn_state_updates(simulator.clone(), config.tick_period(), wall_clock);

    Ok(SimulatorHandle::new(simulator, Some(local_addr), server, updates))
}

/// Serve a dehumidifier over RTU on a serial line.
#[cfg(feature = "serial")]
pub fn start_rtu(
    config: &SimulatorConfig,
    settings: &crate::descriptor::SerialSettings,
) -> Result<SimulatorHandle<SimulatedDehumidifier>, SimulatorError> {
    let simulator = Simulator::new(SimulatedDehumidifier::new(config, wall_clock())?);
    let server = super::spawn_rtu_simulator(settings, simulator.clone())?;
    info!(
        "Dehumidifier unit {} on {}, tick every {:?}",
        config.unit_id,
        settings.path,
        config.tick_period()
    );
    let updates = spawn_state_updates(simulator.clone(), config.tick_period(), wall_clock);

    Ok(SimulatorHandle::new(simulator, None, server, updates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use chrono::NaiveDate;
    use tokio_modbus::{server::Service, SlaveRequest};

    fn at() -> NaiveDateTime {
        // A Sunday.
        NaiveDate::from_ymd_opt(2024, 6, 2)
            .unwrap()
            .and_hms_opt(14, 30, 15)
            .unwrap()
    }

    fn device(seed: u64) -> SimulatedDehumidifier {
        let config = SimulatorConfig {
            seed: Some(seed),
            ..Default::default()
        };
        SimulatedDehumidifier::new(&config, at()).unwrap()
    }

    fn write(device: &mut SimulatedDehumidifier, register: catalog::Register, value: u16) {
        let response = device
            .service_call(Request::WriteSingleRegister(register.address, value))
            .unwrap();
        assert_eq!(response, Response::WriteSingleRegister(register.address, value));
    }

    fn read(device: &mut SimulatedDehumidifier, register: catalog::Register) -> u16 {
        match device.service_call(Request::ReadHoldingRegisters(register.address, 1)) {
            Ok(Response::ReadHoldingRegisters(words)) => words[0],
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn initial_registers() {
        let mut device = device(1);
        assert_eq!(read(&mut device, catalog::TEMPERATURE_1), 0x0519);
        assert_eq!(read(&mut device, catalog::TEMPERATURE_2), 0x001A);
        assert_eq!(read(&mut device, catalog::HUMIDITY_1), 60);
        assert_eq!(read(&mut device, catalog::OPERATION_STATUS), 0x0040);
        assert_eq!(read(&mut device, catalog::PIPE_TEMPERATURE), 150);
        assert_eq!(read(&mut device, catalog::FAN_OPERATION_HOURS), 100);
        assert_eq!(read(&mut device, catalog::FAN_ALARM_HOURS), 2400);
        assert_eq!(read(&mut device, catalog::POWER), 0);
        assert_eq!(read(&mut device, catalog::FAN_SPEED), 1);
        assert_eq!(read(&mut device, catalog::HUMIDITY_SETPOINT), 50);
        assert_eq!(read(&mut device, catalog::CURRENT_TIME), 0x1E0E);
        assert_eq!(read(&mut device, catalog::CURRENT_SECONDS), 15);
        assert_eq!(read(&mut device, catalog::CURRENT_WEEKDAY), 1);
    }

    #[test]
    fn compressor_runs_above_setpoint() {
        let mut device = device(2);
        write(&mut device, catalog::POWER, 1);
        write(&mut device, catalog::DEHUMIDIFY_MODE, 1);
        write(&mut device, catalog::HUMIDITY_SETPOINT, 40);

        device.update_state(at());
        let status = OperationStatus::decode(read(&mut device, catalog::OPERATION_STATUS));
        assert!(status.compressor_on);
        assert!(status.fan_on);
        assert!(read(&mut device, catalog::HUMIDITY_1) < 60);
        assert!(read(&mut device, catalog::HUMIDITY_2) < 60);
    }

    #[test]
    fn fan_only_at_or_below_setpoint() {
        let mut device = device(3);
        write(&mut device, catalog::POWER, 1);
        write(&mut device, catalog::DEHUMIDIFY_MODE, 1);
        write(&mut device, catalog::HUMIDITY_SETPOINT, 70);

        device.update_state(at());
        let status = device.registers().operation_status;
        assert!(!status.compressor_on);
        assert!(status.fan_on);
    }

    #[test]
    fn continuous_runs_until_turned_off() {
        let mut device = device(4);
        write(&mut device, catalog::POWER, 1);
        write(&mut device, catalog::DEHUMIDIFY_MODE, 1);
        write(&mut device, catalog::HUMIDITY_SETPOINT, CONTINUOUS_DEHUMIDIFICATION);

        // Long enough to reach the humidity floor.
        for _ in 0..500 {
            device.update_state(at());
            assert!(device.registers().operation_status.compressor_on);
        }
        assert_eq!(device.registers().humidity_1, MIN_HUMIDITY);

        write(&mut device, catalog::DEHUMIDIFY_MODE, 0);
        device.update_state(at());
        assert!(!device.registers().operation_status.compressor_on);
        assert!(device.registers().operation_status.fan_on);

        write(&mut device, catalog::POWER, 0);
        device.update_state(at());
        assert_eq!(read(&mut device, catalog::OPERATION_STATUS), 0);
    }

    #[test]
    fn humidity_stays_in_range() {
        let mut rising = device(5);
        rising.set_plant(Plant {
            humidity: [89.9, 90.0],
            ..Default::default()
        });
        let mut drying = device(6);
        drying.set_plant(Plant {
            humidity: [20.05, 20.0],
            ..Default::default()
        });
        write(&mut drying, catalog::POWER, 1);
        write(&mut drying, catalog::DEHUMIDIFY_MODE, 1);
        write(&mut drying, catalog::HUMIDITY_SETPOINT, 0);

        let range = f64::from(MIN_HUMIDITY)..=f64::from(MAX_HUMIDITY);
        for _ in 0..200 {
            rising.update_state(at());
            drying.update_state(at());
            for humidity in rising.plant().humidity.iter().chain(&drying.plant().humidity) {
                assert!(range.contains(humidity), "{humidity}");
            }
        }
        assert_eq!(rising.registers().humidity_1, MAX_HUMIDITY);
        assert_eq!(drying.registers().humidity_2, MIN_HUMIDITY);
    }

    #[test]
    fn fan_hours() {
        let config = SimulatorConfig {
            seed: Some(7),
            fan_hours_per_tick: 0.5,
            ..Default::default()
        };
        let mut device = SimulatedDehumidifier::new(&config, at()).unwrap();

        for _ in 0..10 {
            device.update_state(at());
        }
        assert_eq!(device.registers().fan_operation_hours, 100);

        write(&mut device, catalog::POWER, 1);
        let mut last = 100;
        for _ in 0..10 {
            device.update_state(at());
            let hours = read(&mut device, catalog::FAN_OPERATION_HOURS);
            assert!(hours >= last);
            last = hours;
        }
        assert_eq!(last, 105);
    }

    #[test]
    fn same_seed_same_plant() {
        let (mut a, mut b) = (device(42), device(42));
        for _ in 0..20 {
            a.update_state(at());
            b.update_state(at());
        }
        assert_eq!(a.plant(), b.plant());
        assert_eq!(a.registers(), b.registers());
    }

    #[test]
    fn clock_follows_tick_input() {
        let mut device = device(8);
        // A Saturday.
        let later = NaiveDate::from_ymd_opt(2024, 6, 8)
            .unwrap()
            .and_hms_opt(7, 5, 59)
            .unwrap();
        device.update_state(later);
        assert_eq!(device.registers().current_time.to_string(), "07:05");
        assert_eq!(read(&mut device, catalog::CURRENT_SECONDS), 59);
        assert_eq!(read(&mut device, catalog::CURRENT_WEEKDAY), 7);
    }

    #[test]
    fn rejected_requests() {
        let mut device = device(9);
        assert_eq!(
            device.service_call(Request::WriteSingleRegister(catalog::TEMPERATURE_1.address, 0)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            device.service_call(Request::WriteSingleRegister(0x6204, 1)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            device.service_call(Request::ReadHoldingRegisters(0x6107, 1)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            device.service_call(Request::ReadInputRegisters(catalog::TEMPERATURE_1.address, 1)),
            Err(ExceptionCode::IllegalFunction)
        );
        assert_eq!(read(&mut device, catalog::TEMPERATURE_1), 0x0519);
    }

    #[test]
    fn write_multiple_controls() {
        let mut device = device(10);
        let response = device
            .service_call(Request::WriteMultipleRegisters(
                catalog::POWER.address,
                vec![1, 3, 45].into(),
            ))
            .unwrap();
        assert_eq!(response, Response::WriteMultipleRegisters(catalog::POWER.address, 3));
        assert_eq!(device.registers().power, 1);
        assert_eq!(device.registers().fan_speed, 3);
        assert_eq!(device.registers().humidity_setpoint, 45);

        // 0x6204 is not mapped, so the whole write is rejected.
        assert_eq!(
            device.service_call(Request::WriteMultipleRegisters(
                catalog::HUMIDITY_SETPOINT.address,
                vec![50, 1, 1].into(),
            )),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(device.registers().humidity_setpoint, 45);
    }

    #[tokio::test]
    async fn answers_only_its_unit_id() {
        let config = SimulatorConfig {
            unit_id: 3,
            seed: Some(11),
            ..Default::default()
        };
        let simulator = Simulator::new(SimulatedDehumidifier::new(&config, at()).unwrap());
        let read_power = |slave| SlaveRequest {
            slave,
            request: Request::ReadHoldingRegisters(catalog::POWER.address, 1),
        };

        assert_eq!(
            simulator.call(read_power(3)).await,
            Ok(Some(Response::ReadHoldingRegisters(vec![0])))
        );
        assert_eq!(simulator.call(read_power(1)).await, Ok(None));

        // Writes for another unit leave the bank untouched.
        let write_power = SlaveRequest {
            slave: 1,
            request: Request::WriteSingleRegister(catalog::POWER.address, 1),
        };
        assert_eq!(simulator.call(write_power).await, Ok(None));
        assert_eq!(simulator.snapshot().registers().power, 0);
    }
}
