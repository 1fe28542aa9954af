//! Physical links to a Modbus device.
//!
//! A [`Transport`] owns at most one open link. Exchanges take `&mut self`, so
//! a transport can never have two requests in flight.

use std::{io, time::Duration};

use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio_modbus::{
    client::{rtu, tcp, Client, Context},
    Request, Response, Slave,
};

use crate::descriptor::{ConnectionDescriptor, Framing, Link};
use crate::error::{Error, Result};

#[async_trait]
pub trait Transport: Send {
    /// Open the link. On failure no link is left open.
    async fn open(&mut self) -> Result<()>;

    /// Perform one request/response exchange on the open link.
    async fn request(&mut self, request: Request<'static>) -> Result<Response>;

    /// Close the link. Closing a closed transport is a no-op.
    async fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// [`Transport`] backed by a tokio-modbus client context.
pub struct ModbusTransport {
    descriptor: ConnectionDescriptor,
    connect_timeout: Duration,
    context: Option<Context>,
}

impl ModbusTransport {
    pub fn new(descriptor: ConnectionDescriptor, connect_timeout: Duration) -> Self {
        Self {
            descriptor,
            connect_timeout,
            context: None,
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }
}

impl std::fmt::Debug for ModbusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTransport")
            .field("descriptor", &self.descriptor)
            .field("connect_timeout", &self.connect_timeout)
            .field("open", &self.context.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for ModbusTransport {
    async fn open(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Ok(());
        }
        self.descriptor.validate()?;

        let endpoint = self.descriptor.to_string();
        let context = match tokio::time::timeout(self.connect_timeout, connect(&self.descriptor))
            .await
        {
            Ok(Ok(context)) => context,
            Ok(Err(source)) => return Err(Error::Connect { endpoint, source }),
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    endpoint,
                    timeout: self.connect_timeout,
                })
            }
        };
        debug!("Opened {endpoint}");
        self.context = Some(context);

        Ok(())
    }

    async fn request(&mut self, request: Request<'static>) -> Result<Response> {
        let context = self.context.as_mut().ok_or(Error::NotConnected)?;
        match context.call(request).await? {
            Ok(response) => Ok(response),
            Err(exception) => Err(Error::Exception(exception)),
        }
    }

    async fn close(&mut self) {
        if let Some(mut context) = self.context.take() {
            if let Err(err) = context.disconnect().await {
                debug!("Closing {} failed: {err}", self.descriptor);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.context.is_some()
    }
}

async fn connect(descriptor: &ConnectionDescriptor) -> io::Result<Context> {
    let slave = Slave(descriptor.unit_id);
    match &descriptor.link {
        Link::Tcp(settings) => {
            let stream = TcpStream::connect((settings.host.as_str(), settings.port)).await?;
            stream.set_nodelay(true)?;
            Ok(match settings.framing {
                Framing::Tcp => tcp::attach_slave(stream, slave),
                Framing::Rtu => rtu::attach_slave(stream, slave),
            })
        }
        Link::Serial(settings) => open_serial(settings, slave),
    }
}

#[cfg(feature = "serial")]
fn open_serial(settings: &crate::descriptor::SerialSettings, slave: Slave) -> io::Result<Context> {
    let stream = tokio_serial::SerialStream::open(&serial_builder(settings))?;
    Ok(rtu::attach_slave(stream, slave))
}

/// Serial port builder matching the line settings.
#[cfg(feature = "serial")]
pub(crate) fn serial_builder(
    settings: &crate::descriptor::SerialSettings,
) -> tokio_serial::SerialPortBuilder {
    use crate::descriptor::Parity;

    let data_bits = match settings.byte_size {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let parity = match settings.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    };
    let stop_bits = match settings.stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };
    tokio_serial::new(&settings.path, settings.baud_rate)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(stop_bits)
}

#[cfg(not(feature = "serial"))]
fn open_serial(settings: &crate::descriptor::SerialSettings, _slave: Slave) -> io::Result<Context> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!(
            "cannot open {}: built without the `serial` feature",
            settings.path
        ),
    ))
}
