//! Modbus register access for Medole dehumidifiers, based on [tokio-modbus](https://github.com/slowtec/tokio-modbus).

//! ## Layers
//!
//! - [`codec`] and [`catalog`]: the register map and the value encodings of the device,
//! - [`transport`]: one physical link (Modbus-TCP, RTU over TCP or RTU over a serial line),
//! - [`client::DeviceClient`]: serialized open, request, close cycles against one endpoint,
//! - [`registry::EndpointRegistry`]: one shared client per connection descriptor,
//! - [`device`]: typed readings and commands behind the [`device::Poller`] and
//!   [`device::Commander`] traits,
//! - [`simulator`]: a simulated dehumidifier served over Modbus-TCP or RTU.
//!
//! ## Register maps
//!
//! [`core::HoldingRegisterMap`] reads (and writes) a whole struct in batch. The derive macros
//! in [`derive`] implement it, together with [`core::RegisterLayout`] and
//! [`simulator::HoldingRegisterModel`], from `modbus` field attributes.
//!
//! Each mapped field **must** carry a `modbus` attribute with the following key-value pairs:
//! - `addr` - holding register address, `u16` integer,
//! - `access` - `"r"` for read-only or `"rw"` for read-write registers.
//!
//! The field type must implement [`codec::RegisterValue`].
//!
//! The struct `modbus` attribute is optional and configures batch reads. It **can only** contain:
//! - `max_cnt_per_request` - maximum number of registers read by a single request; default `123`,
//! - `allow_gaps` - read across unmapped addresses to save requests; default `false`.
//!   Only use it when the device answers reads of the unmapped addresses.

extern crate self as medole_modbus;

/// Register map of the dehumidifier
pub mod catalog;
pub mod client;
/// Utilities for encoding to and decoding from Modbus registers
pub mod codec;
pub mod config;
/// Core traits to read from and write to Modbus registers
pub mod core;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod registry;
pub mod transport;

/// Device simulator on top of the tokio-modbus servers
#[cfg(feature = "simulator")]
pub mod simulator;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind, Result};

pub mod derive {
    /// Re-export.
    pub use medole_modbus_derive::{HoldingRegisterMap, HoldingRegisterModel, RegisterLayout};
}
