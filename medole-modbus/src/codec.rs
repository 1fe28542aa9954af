use std::fmt;

use serde::{Deserialize, Serialize};

pub use tokio_modbus::{Address, Quantity};

/// 16-bit value stored in Modbus register.
pub type Word = u16;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("temperature tenths byte {0} is out of range 0-9")]
    TenthsOutOfRange(u8),
    #[error("temperature {0} °C is not representable (0.0-255.9)")]
    TemperatureOutOfRange(f32),
    #[error("packed time {hour:02}:{minute:02} is out of range")]
    TimeOutOfRange { hour: u8, minute: u8 },
    #[error("expected {expected} register(s), got {actual}")]
    WordsCount { expected: usize, actual: usize },
    #[error("{encoding:?} register cannot hold a {value} value")]
    ValueMismatch {
        encoding: Encoding,
        value: &'static str,
    },
}

/// How the 16 bits of a holding register are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// Plain unsigned integer.
    Raw16,
    /// Low byte integer °C, high byte tenths.
    FixedPointTemp,
    /// Operating mode and fault flags.
    StatusBitfield,
    /// Low byte hour, high byte minute.
    PackedTime,
}

/// Decoded register value, tagged by encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Raw(Word),
    Temperature(Temperature),
    Status(OperationStatus),
    Time(ClockTime),
}

impl Encoding {
    pub fn decode(self, word: Word) -> Result<Value, CodecError> {
        Ok(match self {
            Encoding::Raw16 => Value::Raw(word),
            Encoding::FixedPointTemp => Value::Temperature(Temperature::from_word(word)?),
            Encoding::StatusBitfield => Value::Status(OperationStatus::from_word(word)?),
            Encoding::PackedTime => Value::Time(ClockTime::from_word(word)?),
        })
    }

    pub fn encode(self, value: &Value) -> Result<Word, CodecError> {
        match (self, value) {
            (Encoding::Raw16, Value::Raw(word)) => Ok(*word),
            (Encoding::FixedPointTemp, Value::Temperature(t)) => t.to_word(),
            (Encoding::StatusBitfield, Value::Status(s)) => s.to_word(),
            (Encoding::PackedTime, Value::Time(t)) => t.to_word(),
            (encoding, value) => Err(CodecError::ValueMismatch {
                encoding,
                value: value.kind(),
            }),
        }
    }
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Raw(_) => "raw",
            Value::Temperature(_) => "temperature",
            Value::Status(_) => "status",
            Value::Time(_) => "time",
        }
    }
}

/// Conversion between a single holding register and a typed value.
///
/// The derive macros in `medole_modbus::derive` rely on this trait to encode
/// and decode every `#[modbus(...)]` field.
pub trait RegisterValue: Sized {
    const ENCODING: Encoding;

    fn to_word(&self) -> Result<Word, CodecError>;
    fn from_word(word: Word) -> Result<Self, CodecError>;

    /// Decode from a register slice which must hold exactly one word.
    fn from_words(words: &[Word]) -> Result<Self, CodecError> {
        match words {
            [word] => Self::from_word(*word),
            _ => Err(CodecError::WordsCount {
                expected: 1,
                actual: words.len(),
            }),
        }
    }
}

impl RegisterValue for u16 {
    const ENCODING: Encoding = Encoding::Raw16;

    fn to_word(&self) -> Result<Word, CodecError> {
        Ok(*self)
    }

    fn from_word(word: Word) -> Result<Self, CodecError> {
        Ok(word)
    }
}

/// Fixed-point temperature with one decimal, 0.0 to 255.9 °C.
///
/// Stored as whole degrees and tenths so that a value read from the wire
/// encodes back to the exact same word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Temperature {
    integer: u8,
    tenths: u8,
}

impl Temperature {
    pub fn new(integer: u8, tenths: u8) -> Result<Self, CodecError> {
        if tenths > 9 {
            return Err(CodecError::TenthsOutOfRange(tenths));
        }
        Ok(Self { integer, tenths })
    }

    /// Round to the nearest tenth.
    pub fn from_celsius(celsius: f32) -> Result<Self, CodecError> {
        let scaled = (celsius * 10.0).round();
        if !(0.0..=2559.0).contains(&scaled) {
            return Err(CodecError::TemperatureOutOfRange(celsius));
        }
        let scaled = scaled as u16;
        Ok(Self {
            integer: (scaled / 10) as u8,
            tenths: (scaled % 10) as u8,
        })
    }

    pub fn celsius(&self) -> f32 {
        f32::from(self.integer) + f32::from(self.tenths) / 10.0
    }

    pub fn integer(&self) -> u8 {
        self.integer
    }

    pub fn tenths(&self) -> u8 {
        self.tenths
    }
}

impl RegisterValue for Temperature {
    const ENCODING: Encoding = Encoding::FixedPointTemp;

    fn to_word(&self) -> Result<Word, CodecError> {
        Ok(u16::from_le_bytes([self.integer, self.tenths]))
    }

    fn from_word(word: Word) -> Result<Self, CodecError> {
        let [integer, tenths] = word.to_le_bytes();
        Self::new(integer, tenths)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} °C", self.integer, self.tenths)
    }
}

/// Wall clock time of day as packed by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, CodecError> {
        if hour > 23 || minute > 59 {
            return Err(CodecError::TimeOutOfRange { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl RegisterValue for ClockTime {
    const ENCODING: Encoding = Encoding::PackedTime;

    fn to_word(&self) -> Result<Word, CodecError> {
        Ok(u16::from_le_bytes([self.hour, self.minute]))
    }

    fn from_word(word: Word) -> Result<Self, CodecError> {
        let [hour, minute] = word.to_le_bytes();
        Self::new(hour, minute)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// Operation status bits, low byte.
pub const STATUS_COMPRESSOR_ON: Word = 0x0080;
pub const STATUS_FAN_ON: Word = 0x0040;
pub const STATUS_PIPE_TEMP_ERROR: Word = 0x0010;
pub const STATUS_HUMIDITY_SENSOR_ERROR: Word = 0x0008;
pub const STATUS_ROOM_TEMP_ERROR: Word = 0x0004;
pub const STATUS_WATER_FULL_ERROR: Word = 0x0002;
// High byte.
pub const STATUS_HIGH_PRESSURE_ERROR: Word = 0x0800;
pub const STATUS_LOW_PRESSURE_ERROR: Word = 0x0400;

/// Decoded operation status register.
///
/// Every 16-bit pattern is a valid input; bits without a meaning are dropped
/// on decode and encode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationStatus {
    pub compressor_on: bool,
    pub fan_on: bool,
    pub pipe_temp_error: bool,
    pub humidity_sensor_error: bool,
    pub room_temp_error: bool,
    pub water_full_error: bool,
    pub high_pressure_error: bool,
    pub low_pressure_error: bool,
}

impl OperationStatus {
    const FLAGS: [(Word, &'static str); 8] = [
        (STATUS_COMPRESSOR_ON, "compressor_on"),
        (STATUS_FAN_ON, "fan_on"),
        (STATUS_PIPE_TEMP_ERROR, "pipe_temp_error"),
        (STATUS_HUMIDITY_SENSOR_ERROR, "humidity_sensor_error"),
        (STATUS_ROOM_TEMP_ERROR, "room_temp_error"),
        (STATUS_WATER_FULL_ERROR, "water_full_error"),
        (STATUS_HIGH_PRESSURE_ERROR, "high_pressure_error"),
        (STATUS_LOW_PRESSURE_ERROR, "low_pressure_error"),
    ];

    pub fn decode(word: Word) -> Self {
        let bit = |mask: Word| word & mask != 0;
        Self {
            compressor_on: bit(STATUS_COMPRESSOR_ON),
            fan_on: bit(STATUS_FAN_ON),
            pipe_temp_error: bit(STATUS_PIPE_TEMP_ERROR),
            humidity_sensor_error: bit(STATUS_HUMIDITY_SENSOR_ERROR),
            room_temp_error: bit(STATUS_ROOM_TEMP_ERROR),
            water_full_error: bit(STATUS_WATER_FULL_ERROR),
            high_pressure_error: bit(STATUS_HIGH_PRESSURE_ERROR),
            low_pressure_error: bit(STATUS_LOW_PRESSURE_ERROR),
        }
    }

    pub fn encode(&self) -> Word {
        self.flags()
            .into_iter()
            .zip(Self::FLAGS)
            .filter(|(set, _)| *set)
            .fold(0, |word, (_, (mask, _))| word | mask)
    }

    fn flags(&self) -> [bool; 8] {
        [
            self.compressor_on,
            self.fan_on,
            self.pipe_temp_error,
            self.humidity_sensor_error,
            self.room_temp_error,
            self.water_full_error,
            self.high_pressure_error,
            self.low_pressure_error,
        ]
    }

    /// Names of the active fault flags, in register bit order.
    pub fn errors(&self) -> Vec<&'static str> {
        self.flags()
            .into_iter()
            .zip(Self::FLAGS)
            .skip(2)
            .filter(|(set, _)| *set)
            .map(|(_, (_, name))| name)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// One line state: faults first, then compressor, then fan.
    pub fn summary(&self) -> String {
        let errors = self.errors();
        if !errors.is_empty() {
            format!("Error: {}", errors.join(", "))
        } else if self.compressor_on {
            "Dehumidifying".to_string()
        } else if self.fan_on {
            "Fan Only".to_string()
        } else {
            "Idle".to_string()
        }
    }
}

impl RegisterValue for OperationStatus {
    const ENCODING: Encoding = Encoding::StatusBitfield;

    fn to_word(&self) -> Result<Word, CodecError> {
        Ok(self.encode())
    }

    fn from_word(word: Word) -> Result<Self, CodecError> {
        Ok(Self::decode(word))
    }
}
