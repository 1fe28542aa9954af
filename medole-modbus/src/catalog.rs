//! Holding register map of the dehumidifier.
//!
//! | Address | Name | Access | Encoding |
//! |---|---|---|---|
//! | 0x6101 | Temperature 1 | R | FixedPointTemp |
//! | 0x6102 | Humidity 1 | R | Raw16 (%) |
//! | 0x6103 | Temperature 2 | R | FixedPointTemp |
//! | 0x6104 | Humidity 2 | R | Raw16 (%) |
//! | 0x6105 | Operation Status | R | StatusBitfield |
//! | 0x6106 | Pipe Temperature | R | Raw16 (tenths °C) |
//! | 0x6111 | Fan Operation Hours | R | Raw16 |
//! | 0x6112 | Fan Alarm Hours | R | Raw16 |
//! | 0x6201 | Power | RW | Raw16 (0/1) |
//! | 0x6202 | Fan Speed | RW | Raw16 (1=Low,2=Medium,3=High) |
//! | 0x6203 | Humidity Setpoint | RW | Raw16 (0=continuous, else %) |
//! | 0x6205 | Dehumidify Mode | RW | Raw16 (0/1) |
//! | 0x6206 | Purify Mode | RW | Raw16 (0/1) |
//! | 0x6401 | Current Time | R | PackedTime |
//! | 0x6402 | Current Seconds | R | Raw16 |
//! | 0x6403 | Current Weekday | R | Raw16 (1=Sun..7=Sat) |
//! | 0x6404 | Timer Function | RW | Raw16 |

use serde::{Deserialize, Serialize};

use crate::codec::{Address, CodecError, Encoding, Value, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    pub fn is_writable(self) -> bool {
        matches!(self, Access::ReadWrite)
    }
}

/// A single holding register definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub name: &'static str,
    pub address: Address,
    pub access: Access,
    pub encoding: Encoding,
}

impl Register {
    pub const fn new(
        name: &'static str,
        address: Address,
        access: Access,
        encoding: Encoding,
    ) -> Self {
        Self {
            name,
            address,
            access,
            encoding,
        }
    }

    pub fn decode(&self, word: Word) -> Result<Value, CodecError> {
        self.encoding.decode(word)
    }

    pub fn encode(&self, value: &Value) -> Result<Word, CodecError> {
        self.encoding.encode(value)
    }
}

use Access::{ReadOnly, ReadWrite};
use Encoding::{FixedPointTemp, PackedTime, Raw16, StatusBitfield};

// Sensor data
pub const TEMPERATURE_1: Register =
    Register::new("temperature_1", 0x6101, ReadOnly, FixedPointTemp);
pub const HUMIDITY_1: Register = Register::new("humidity_1", 0x6102, ReadOnly, Raw16);
pub const TEMPERATURE_2: Register =
    Register::new("temperature_2", 0x6103, ReadOnly, FixedPointTemp);
pub const HUMIDITY_2: Register = Register::new("humidity_2", 0x6104, ReadOnly, Raw16);
pub const OPERATION_STATUS: Register =
    Register::new("operation_status", 0x6105, ReadOnly, StatusBitfield);
/// Tenths of °C.
pub const PIPE_TEMPERATURE: Register = Register::new("pipe_temperature", 0x6106, ReadOnly, Raw16);
pub const FAN_OPERATION_HOURS: Register =
    Register::new("fan_operation_hours", 0x6111, ReadOnly, Raw16);
pub const FAN_ALARM_HOURS: Register = Register::new("fan_alarm_hours", 0x6112, ReadOnly, Raw16);

// Control
pub const POWER: Register = Register::new("power", 0x6201, ReadWrite, Raw16);
pub const FAN_SPEED: Register = Register::new("fan_speed", 0x6202, ReadWrite, Raw16);
pub const HUMIDITY_SETPOINT: Register =
    Register::new("humidity_setpoint", 0x6203, ReadWrite, Raw16);
pub const DEHUMIDIFY_MODE: Register = Register::new("dehumidify_mode", 0x6205, ReadWrite, Raw16);
pub const PURIFY_MODE: Register = Register::new("purify_mode", 0x6206, ReadWrite, Raw16);

// Time functions
pub const CURRENT_TIME: Register = Register::new("current_time", 0x6401, ReadOnly, PackedTime);
pub const CURRENT_SECONDS: Register = Register::new("current_seconds", 0x6402, ReadOnly, Raw16);
pub const CURRENT_WEEKDAY: Register = Register::new("current_weekday", 0x6403, ReadOnly, Raw16);
pub const TIMER_FUNCTION: Register = Register::new("timer_function", 0x6404, ReadWrite, Raw16);

/// Every register, sorted by address.
pub const REGISTERS: [Register; 17] = [
    TEMPERATURE_1,
    HUMIDITY_1,
    TEMPERATURE_2,
    HUMIDITY_2,
    OPERATION_STATUS,
    PIPE_TEMPERATURE,
    FAN_OPERATION_HOURS,
    FAN_ALARM_HOURS,
    POWER,
    FAN_SPEED,
    HUMIDITY_SETPOINT,
    DEHUMIDIFY_MODE,
    PURIFY_MODE,
    CURRENT_TIME,
    CURRENT_SECONDS,
    CURRENT_WEEKDAY,
    TIMER_FUNCTION,
];

pub fn lookup(address: Address) -> Option<&'static Register> {
    REGISTERS
        .binary_search_by_key(&address, |register| register.address)
        .ok()
        .map(|index| &REGISTERS[index])
}

pub const FAN_SPEED_LOW: Word = 1;
pub const FAN_SPEED_MEDIUM: Word = 2;
pub const FAN_SPEED_HIGH: Word = 3;

/// Humidity setpoint value that keeps the compressor running.
pub const CONTINUOUS_DEHUMIDIFICATION: Word = 0;

pub const MIN_HUMIDITY: Word = 20;
pub const MAX_HUMIDITY: Word = 90;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_are_sorted_and_unique() {
        assert!(REGISTERS.windows(2).all(|w| w[0].address < w[1].address));
    }

    #[test]
    fn lookup_finds_every_register() {
        for register in REGISTERS {
            assert_eq!(lookup(register.address), Some(&register));
        }
        assert_eq!(lookup(0x6204), None);
        assert_eq!(lookup(0x0000), None);
    }

    #[test]
    fn control_registers_are_writable() {
        let writable = REGISTERS
            .iter()
            .filter(|r| r.access.is_writable())
            .map(|r| r.address)
            .collect::<Vec<_>>();
        assert_eq!(writable, [0x6201, 0x6202, 0x6203, 0x6205, 0x6206, 0x6404]);
    }

    #[test]
    fn register_decode_uses_its_encoding() {
        let value = OPERATION_STATUS.decode(0x00C0).unwrap();
        match value {
            Value::Status(status) => assert!(status.compressor_on && status.fan_on),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(PIPE_TEMPERATURE.decode(150).unwrap(), Value::Raw(150));
    }
}
