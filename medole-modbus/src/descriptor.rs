use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_modbus::SlaveId;

use crate::error::{Error, Result};

pub const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_BYTE_SIZE: u8 = 8;
pub const DEFAULT_STOP_BITS: u8 = 1;
pub const DEFAULT_TCP_PORT: u16 = 502;
pub const DEFAULT_UNIT_ID: SlaveId = 1;
pub const MAX_UNIT_ID: SlaveId = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    #[serde(alias = "N")]
    None,
    #[serde(alias = "E")]
    Even,
    #[serde(alias = "O")]
    Odd,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialSettings {
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_byte_size")]
    pub byte_size: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

impl SerialSettings {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            byte_size: DEFAULT_BYTE_SIZE,
            parity: Parity::default(),
            stop_bits: DEFAULT_STOP_BITS,
        }
    }
}

/// Byte framing used on a TCP socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Standard Modbus-TCP (MBAP header).
    #[default]
    Tcp,
    /// RTU frames (with CRC) carried over a TCP socket.
    Rtu,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TcpSettings {
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    #[serde(default)]
    pub framing: Framing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Link {
    Serial(SerialSettings),
    Tcp(TcpSettings),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Serial,
    Tcp,
    RtuOverTcp,
}

/// Identity of one physical Modbus endpoint.
///
/// Structurally equal descriptors address the same device and resolve to the
/// same [`crate::client::DeviceClient`] in an [`crate::registry::EndpointRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub link: Link,
    #[serde(default = "default_unit_id")]
    pub unit_id: SlaveId,
}

impl ConnectionDescriptor {
    pub fn tcp(host: impl Into<String>, port: u16, unit_id: SlaveId) -> Self {
        Self {
            link: Link::Tcp(TcpSettings {
                host: host.into(),
                port,
                framing: Framing::Tcp,
            }),
            unit_id,
        }
    }

    pub fn rtu_over_tcp(host: impl Into<String>, port: u16, unit_id: SlaveId) -> Self {
        Self {
            link: Link::Tcp(TcpSettings {
                host: host.into(),
                port,
                framing: Framing::Rtu,
            }),
            unit_id,
        }
    }

    pub fn serial(settings: SerialSettings, unit_id: SlaveId) -> Self {
        Self {
            link: Link::Serial(settings),
            unit_id,
        }
    }

    pub fn kind(&self) -> TransportKind {
        match &self.link {
            Link::Serial(_) => TransportKind::Serial,
            Link::Tcp(TcpSettings {
                framing: Framing::Tcp,
                ..
            }) => TransportKind::Tcp,
            Link::Tcp(TcpSettings {
                framing: Framing::Rtu,
                ..
            }) => TransportKind::RtuOverTcp,
        }
    }

    /// Check every parameter against the ranges the device supports.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_UNIT_ID).contains(&self.unit_id) {
            return Err(invalid(format!(
                "unit id {} is outside 1-{MAX_UNIT_ID}",
                self.unit_id
            )));
        }
        match &self.link {
            Link::Serial(serial) => {
                if serial.path.trim().is_empty() {
                    return Err(invalid("serial port path is empty".to_string()));
                }
                if !BAUD_RATES.contains(&serial.baud_rate) {
                    return Err(invalid(format!(
                        "baud rate {} is not one of {BAUD_RATES:?}",
                        serial.baud_rate
                    )));
                }
                if !(5..=8).contains(&serial.byte_size) {
                    return Err(invalid(format!(
                        "byte size {} is outside 5-8",
                        serial.byte_size
                    )));
                }
                if !(1..=2).contains(&serial.stop_bits) {
                    return Err(invalid(format!(
                        "stop bits {} is not 1 or 2",
                        serial.stop_bits
                    )));
                }
            }
            Link::Tcp(tcp) => {
                if tcp.host.trim().is_empty() {
                    return Err(invalid("host is empty".to_string()));
                }
                if tcp.port == 0 {
                    return Err(invalid("port 0 is not allowed".to_string()));
                }
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> Error {
    Error::InvalidDescriptor(reason)
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link {
            Link::Serial(s) => write!(
                f,
                "serial://{}@{}/{}{}{}",
                s.path,
                s.baud_rate,
                s.byte_size,
                s.parity.letter(),
                s.stop_bits
            )?,
            Link::Tcp(t) => {
                let scheme = match t.framing {
                    Framing::Tcp => "tcp",
                    Framing::Rtu => "rtu-over-tcp",
                };
                write!(f, "{scheme}://{}:{}", t.host, t.port)?
            }
        }
        write!(f, "#{}", self.unit_id)
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_byte_size() -> u8 {
    DEFAULT_BYTE_SIZE
}

fn default_stop_bits() -> u8 {
    DEFAULT_STOP_BITS
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_unit_id() -> SlaveId {
    DEFAULT_UNIT_ID
}
