//! Configuration for clients and the simulator.
//!
//! Everything deserializes from YAML; missing keys fall back to the defaults
//! documented on each field.

use std::{net::SocketAddr, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_modbus::SlaveId;

use crate::descriptor::DEFAULT_UNIT_ID;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_SIMULATOR_ADDR: &str = "127.0.0.1:5020";
pub const DEFAULT_FAN_HOURS_PER_TICK: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yml::Error,
    },
    #[error("invalid socket address {0:?}")]
    Address(String),
}

/// Settings shared by every [`crate::client::DeviceClient`] of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Bound on connecting and on every single request, in milliseconds (default `1000`).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ClientSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Listen address of the Modbus-TCP server (default `127.0.0.1:5020`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Unit id of the register bank (default `1`).
    #[serde(default = "default_unit_id")]
    pub unit_id: SlaveId,
    /// Period of the plant update, in milliseconds (default `5000`).
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    /// Fan operation hours added per tick while the fan runs (default `0.01`).
    #[serde(default = "default_fan_hours_per_tick")]
    pub fan_hours_per_tick: f64,
    /// Seed of the plant noise; a time based seed is used when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(text)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Address(self.listen.clone()))
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            unit_id: DEFAULT_UNIT_ID,
            tick_period_ms: default_tick_period_ms(),
            fan_hours_per_tick: DEFAULT_FAN_HOURS_PER_TICK,
            seed: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_listen() -> String {
    DEFAULT_SIMULATOR_ADDR.to_string()
}

fn default_unit_id() -> SlaveId {
    DEFAULT_UNIT_ID
}

fn default_tick_period_ms() -> u64 {
    DEFAULT_TICK_PERIOD.as_millis() as u64
}

fn default_fan_hours_per_tick() -> f64 {
    DEFAULT_FAN_HOURS_PER_TICK
}
