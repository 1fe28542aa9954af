//! Dehumidifier level API: typed readings and commands.
//!
//! [`Poller`] and [`Commander`] are the only surface a host integration
//! needs. [`Dehumidifier`] implements both on top of a shared
//! [`DeviceClient`].

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use log::debug;

use crate::catalog::{
    self, CONTINUOUS_DEHUMIDIFICATION, FAN_SPEED_HIGH, FAN_SPEED_LOW, FAN_SPEED_MEDIUM,
    MAX_HUMIDITY, MIN_HUMIDITY,
};
use crate::client::DeviceClient;
use crate::codec::{ClockTime, OperationStatus, Temperature, Word};
use crate::core::HoldingRegisterMap;
use crate::derive::{HoldingRegisterMap, RegisterLayout};
use crate::error::Result;

/// Every register of the dehumidifier, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, HoldingRegisterMap, RegisterLayout)]
#[cfg_attr(feature = "simulator", derive(crate::derive::HoldingRegisterModel))]
pub struct DehumidifierRegisters {
    #[modbus(addr = 0x6101, access = "r")]
    pub temperature_1: Temperature,
    #[modbus(addr = 0x6102, access = "r")]
    pub humidity_1: u16,
    #[modbus(addr = 0x6103, access = "r")]
    pub temperature_2: Temperature,
    #[modbus(addr = 0x6104, access = "r")]
    pub humidity_2: u16,
    #[modbus(addr = 0x6105, access = "r")]
    pub operation_status: OperationStatus,
    /// Tenths of °C.
    #[modbus(addr = 0x6106, access = "r")]
    pub pipe_temperature: u16,
    #[modbus(addr = 0x6111, access = "r")]
    pub fan_operation_hours: u16,
    #[modbus(addr = 0x6112, access = "r")]
    pub fan_alarm_hours: u16,

    #[modbus(addr = 0x6201, access = "rw")]
    pub power: u16,
    #[modbus(addr = 0x6202, access = "rw")]
    pub fan_speed: u16,
    #[modbus(addr = 0x6203, access = "rw")]
    pub humidity_setpoint: u16,
    #[modbus(addr = 0x6205, access = "rw")]
    pub dehumidify_mode: u16,
    #[modbus(addr = 0x6206, access = "rw")]
    pub purify_mode: u16,

    #[modbus(addr = 0x6401, access = "r")]
    pub current_time: ClockTime,
    #[modbus(addr = 0x6402, access = "r")]
    pub current_seconds: u16,
    /// 1 is Sunday, 7 is Saturday.
    #[modbus(addr = 0x6403, access = "r")]
    pub current_weekday: u16,
    #[modbus(addr = 0x6404, access = "rw")]
    pub timer_function: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    Low,
    Medium,
    High,
    Unknown(Word),
}

impl FanSpeed {
    pub fn from_word(word: Word) -> Self {
        match word {
            FAN_SPEED_LOW => FanSpeed::Low,
            FAN_SPEED_MEDIUM => FanSpeed::Medium,
            FAN_SPEED_HIGH => FanSpeed::High,
            other => FanSpeed::Unknown(other),
        }
    }

    pub fn to_word(self) -> Word {
        match self {
            FanSpeed::Low => FAN_SPEED_LOW,
            FanSpeed::Medium => FAN_SPEED_MEDIUM,
            FanSpeed::High => FAN_SPEED_HIGH,
            FanSpeed::Unknown(word) => word,
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanSpeed::Low => write!(f, "Low"),
            FanSpeed::Medium => write!(f, "Medium"),
            FanSpeed::High => write!(f, "High"),
            FanSpeed::Unknown(word) => write!(f, "Unknown ({word})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumiditySetpoint {
    /// Dehumidify regardless of the measured humidity.
    Continuous,
    Percent(u16),
}

impl HumiditySetpoint {
    pub fn from_word(word: Word) -> Self {
        match word {
            CONTINUOUS_DEHUMIDIFICATION => HumiditySetpoint::Continuous,
            percent => HumiditySetpoint::Percent(percent),
        }
    }
}

/// What the device is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Off,
    Drying,
    Idle,
}

/// Decoded snapshot of the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Readings {
    pub temperature_1: f32,
    pub humidity_1: u16,
    pub temperature_2: f32,
    pub humidity_2: u16,
    pub operation_status: OperationStatus,
    pub pipe_temperature: f32,
    pub fan_operation_hours: u16,
    pub fan_alarm_hours: u16,
    pub power: bool,
    pub fan_speed: FanSpeed,
    pub humidity_setpoint: HumiditySetpoint,
    pub dehumidify_mode: bool,
    pub purify_mode: bool,
    pub current_time: ClockTime,
    pub current_seconds: u16,
    pub current_weekday: u16,
    pub timer_function: u16,
}

impl Readings {
    pub fn action(&self) -> Action {
        if !self.power {
            Action::Off
        } else if self.operation_status.compressor_on {
            Action::Drying
        } else {
            Action::Idle
        }
    }

    /// Setpoint as a humidity; continuous operation targets the minimum.
    pub fn target_humidity(&self) -> u16 {
        match self.humidity_setpoint {
            HumiditySetpoint::Continuous => MIN_HUMIDITY,
            HumiditySetpoint::Percent(percent) => percent,
        }
    }

    pub fn status_summary(&self) -> String {
        self.operation_status.summary()
    }
}

impl From<&DehumidifierRegisters> for Readings {
    fn from(registers: &DehumidifierRegisters) -> Self {
        Self {
            temperature_1: registers.temperature_1.celsius(),
            humidity_1: registers.humidity_1,
            temperature_2: registers.temperature_2.celsius(),
            humidity_2: registers.humidity_2,
            operation_status: registers.operation_status,
            pipe_temperature: f32::from(registers.pipe_temperature) / 10.0,
            fan_operation_hours: registers.fan_operation_hours,
            fan_alarm_hours: registers.fan_alarm_hours,
            power: registers.power == 1,
            fan_speed: FanSpeed::from_word(registers.fan_speed),
            humidity_setpoint: HumiditySetpoint::from_word(registers.humidity_setpoint),
            dehumidify_mode: registers.dehumidify_mode == 1,
            purify_mode: registers.purify_mode == 1,
            current_time: registers.current_time,
            current_seconds: registers.current_seconds,
            current_weekday: registers.current_weekday,
            timer_function: registers.timer_function,
        }
    }
}

impl fmt::Display for Readings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} °C / {} %, {:.1} °C / {} %, pipe {:.1} °C, target {} %, fan {}, {} ({:?}), {}",
            self.temperature_1,
            self.humidity_1,
            self.temperature_2,
            self.humidity_2,
            self.pipe_temperature,
            self.target_humidity(),
            self.fan_speed,
            self.status_summary(),
            self.action(),
            self.current_time,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Power on in dehumidify mode with purify off.
    TurnOn,
    TurnOff,
    SetFanSpeed(FanSpeed),
    /// Clamped to the supported humidity range.
    SetHumidity(u16),
    SetContinuous,
    SetDehumidifyMode(bool),
    SetPurifyMode(bool),
    SetTimer(u16),
}

impl Command {
    /// Register writes carrying out the command, in order.
    pub fn writes(&self) -> Vec<(catalog::Register, Word)> {
        match *self {
            Command::TurnOn => vec![
                (catalog::POWER, 1),
                (catalog::DEHUMIDIFY_MODE, 1),
                (catalog::PURIFY_MODE, 0),
            ],
            Command::TurnOff => vec![(catalog::POWER, 0)],
            Command::SetFanSpeed(speed) => vec![(catalog::FAN_SPEED, speed.to_word())],
            Command::SetHumidity(percent) => vec![(
                catalog::HUMIDITY_SETPOINT,
                percent.clamp(MIN_HUMIDITY, MAX_HUMIDITY),
            )],
            Command::SetContinuous => {
                vec![(catalog::HUMIDITY_SETPOINT, CONTINUOUS_DEHUMIDIFICATION)]
            }
            Command::SetDehumidifyMode(on) => vec![(catalog::DEHUMIDIFY_MODE, Word::from(on))],
            Command::SetPurifyMode(on) => vec![(catalog::PURIFY_MODE, Word::from(on))],
            Command::SetTimer(value) => vec![(catalog::TIMER_FUNCTION, value)],
        }
    }
}

#[async_trait]
pub trait Poller: Send + Sync {
    async fn refresh(&self) -> Result<Readings>;
}

#[async_trait]
pub trait Commander: Send + Sync {
    async fn apply(&self, command: Command) -> Result<()>;
}

/// A dehumidifier reached through a [`DeviceClient`].
#[derive(Debug)]
pub struct Dehumidifier {
    client: Arc<DeviceClient>,
    cached: Mutex<Option<Readings>>,
}

impl Dehumidifier {
    pub fn new(client: Arc<DeviceClient>) -> Self {
        Self {
            client,
            cached: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<DeviceClient> {
        &self.client
    }

    /// Readings of the last successful refresh.
    pub fn cached(&self) -> Option<Readings> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Poller for Dehumidifier {
    async fn refresh(&self) -> Result<Readings> {
        let registers = DehumidifierRegisters::from_holding_registers(self.client.as_ref()).await?;
        let readings = Readings::from(&registers);
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(readings.clone());

        Ok(readings)
    }
}

#[async_trait]
impl Commander for Dehumidifier {
    /// Stops at the first failed write; the client has already logged it.
    async fn apply(&self, command: Command) -> Result<()> {
        debug!("{}: applying {command:?}", self.client.descriptor());
        for (register, word) in command.writes() {
            self.client.write_register(register.address, word).await?;
        }

        Ok(())
    }
}
