//! Device simulation on top of the tokio-modbus servers.
//!
//! A [`Device`] owns its register bank and its plant state. [`Simulator`]
//! shares one device between the Modbus server and the periodic update task
//! behind a single mutex, so every request and every update is atomic.

use std::{
    collections::{HashMap, HashSet},
    marker::PhantomData,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_modbus::{server, ExceptionCode, Request, Response, SlaveId, SlaveRequest};

use crate::catalog::Access;
use crate::codec::{Address, CodecError, Quantity, Word};
use crate::config::ConfigError;

pub mod dehumidifier;

#[cfg(feature = "serial")]
pub use dehumidifier::start_rtu;
pub use dehumidifier::{start_tcp, wall_clock, Plant, SimulatedDehumidifier};

#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open serial port {path}: {source}")]
    Serial {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("initial register values are not encodable: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Default)]
/// A raw holding register bank with per-register access.
pub struct Registers {
    words: HashMap<Address, Word>,
    writable: HashSet<Address>,
}

impl Registers {
    /// Define the register at `addr` with its initial value.
    pub fn insert(&mut self, addr: Address, access: Access, word: Word) {
        self.words.insert(addr, word);
        if access.is_writable() {
            self.writable.insert(addr);
        } else {
            self.writable.remove(&addr);
        }
    }

    pub fn get(&self, addr: Address) -> Option<Word> {
        self.words.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Read `cnt` consecutive registers starting at `addr`.
    pub fn read(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>, ExceptionCode> {
        if cnt == 0 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        (0..cnt)
            .map(|i| {
                addr.checked_add(i)
                    .and_then(|reg_addr| self.get(reg_addr))
                    .ok_or(ExceptionCode::IllegalDataAddress)
            })
            .collect()
    }

    /// Client write of consecutive registers. Nothing is written unless
    /// every target exists and is writable.
    pub fn write(&mut self, addr: Address, words: &[Word]) -> Result<(), ExceptionCode> {
        if words.is_empty() {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let all_writable = (0..words.len()).all(|i| {
            Address::try_from(i)
                .ok()
                .and_then(|i| addr.checked_add(i))
                .is_some_and(|reg_addr| self.writable.contains(&reg_addr))
        });
        if !all_writable {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        for (i, word) in words.iter().enumerate() {
            self.words.insert(addr + i as Address, *word);
        }

        Ok(())
    }

    /// Device-side update of a defined register, regardless of access.
    pub fn store(&mut self, addr: Address, word: Word) {
        if let Some(slot) = self.words.get_mut(&addr) {
            *slot = word;
        }
    }
}

/// Link between [`Registers`] and a typed register map, for simulation.
///
/// Complements [`crate::core::HoldingRegisterMap`] on the server side; usually
/// derived.
pub trait HoldingRegisterModel {
    fn new_registers(&self) -> Result<Registers, CodecError>;
    fn update_registers(&self, registers: &mut Registers) -> Result<(), CodecError>;
    fn update_self(&mut self, registers: &Registers) -> Result<(), CodecError>;
}

#[derive(Debug, Clone)]
/// Register bank of a simulated device, kept in sync with its model `H`.
pub struct DataStore<H> {
    pub holding_registers: Registers,
    holding_register_model: PhantomData<H>,
}

impl<H: HoldingRegisterModel> DataStore<H> {
    pub fn new(model: &H) -> Result<Self, CodecError> {
        Ok(Self {
            holding_registers: model.new_registers()?,
            holding_register_model: PhantomData,
        })
    }

    /// Copy the model into the registers.
    pub fn sync(&mut self, model: &H) -> Result<(), CodecError> {
        model.update_registers(&mut self.holding_registers)
    }

    /// Answer one request; used to implement the tokio-modbus server `Service`.
    pub fn service_call(
        &mut self,
        model: &mut H,
        req: Request<'_>,
    ) -> Result<Response, ExceptionCode> {
        match req {
            Request::ReadHoldingRegisters(addr, cnt) => self
                .holding_registers
                .read(addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::WriteSingleRegister(addr, value) => {
                self.write(model, addr, std::slice::from_ref(&value))?;
                Ok(Response::WriteSingleRegister(addr, value))
            }
            Request::WriteMultipleRegisters(addr, values) => {
                self.write(model, addr, &values)?;
                Ok(Response::WriteMultipleRegisters(addr, values.len() as Quantity))
            }
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }

    fn write(&mut self, model: &mut H, addr: Address, words: &[Word]) -> Result<(), ExceptionCode> {
        let previous = self.holding_registers.clone();
        self.holding_registers.write(addr, words)?;
        if let Err(err) = model.update_self(&self.holding_registers) {
            warn!("Rejected write at {addr:#06x}: {err}");
            self.holding_registers = previous;
            return Err(ExceptionCode::IllegalDataValue);
        }

        Ok(())
    }
}

/// Modbus device simulator trait.
/// The type should use a [`DataStore`] and keep it in sync with its register model.
pub trait Device {
    type HoldingRegisters: HoldingRegisterModel;
    /// Outside input to one state update.
    type Input;

    /// The only unit id the device answers.
    fn unit_id(&self) -> SlaveId;

    fn service_call(&mut self, req: Request<'_>) -> Result<Response, ExceptionCode>;

    fn update_state(&mut self, input: Self::Input);
}

/// Shared handle to a [`Device`], implementing the tokio-modbus server `Service`.
#[derive(Debug)]
pub struct Simulator<D>(Arc<Mutex<D>>);

impl<D> Clone for Simulator<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D: Device> Simulator<D> {
    pub fn new(device: D) -> Self {
        Self(Arc::new(Mutex::new(device)))
    }

    /// Run `f` with exclusive access to the device.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut device = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut device)
    }

    /// Run one state update now.
    pub fn tick(&self, input: D::Input) {
        self.with_device(|device| device.update_state(input))
    }

    pub fn snapshot(&self) -> D
    where
        D: Clone,
    {
        self.with_device(|device| device.clone())
    }
}

/// Frames for another unit id get no response, as on a shared bus.
impl<D: Device> server::Service for Simulator<D> {
    type Request = SlaveRequest<'static>;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let SlaveRequest { slave, request } = req;
        debug!("Simulator request for unit {slave}: {request:?}");
        let res = self.with_device(|device| {
            if slave != device.unit_id() {
                debug!("Ignoring request for unit {slave}, serving unit {}", device.unit_id());
                return Ok(None);
            }
            device.service_call(request).map(Some)
        });
        if let Err(exception) = &res {
            warn!("Simulator answered with exception {exception:?}");
        }
        future::ready(res)
    }
}

async fn run_tcp_server<D: Device + Send + 'static>(
    server: server::tcp::Server,
    simulator: Simulator<D>,
) {
    let new_service = |_socket_addr| Ok(Some(simulator.clone()));
    let on_connected = |stream, socket_addr| async move {
        server::tcp::accept_tcp_connection(stream, socket_addr, new_service)
    };
    let on_process_error = |err| {
        error!("Simulator connection error: {err}");
    };
    if let Err(err) = server.serve(&on_connected, on_process_error).await {
        error!("Simulator server stopped: {err}");
    }
}

/// Bind `socket_addr` and serve the simulator over Modbus-TCP until aborted.
///
/// Returns the bound address, so port `0` yields an ephemeral port.
pub async fn spawn_tcp_simulator<D: Device + Send + 'static>(
    socket_addr: SocketAddr,
    simulator: Simulator<D>,
) -> Result<(SocketAddr, JoinHandle<()>), SimulatorError> {
    let bind_error = |source| SimulatorError::Bind {
        addr: socket_addr.to_string(),
        source,
    };
    let listener = TcpListener::bind(socket_addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    let server = server::tcp::Server::new(listener);

    info!("Simulator listening on {local_addr}");
    let handle = tokio::spawn(run_tcp_server(server, simulator));

    Ok((local_addr, handle))
}

/// Serve the simulator over RTU on a serial line until aborted.
#[cfg(feature = "serial")]
pub fn spawn_rtu_simulator<D: Device + Send + 'static>(
    settings: &crate::descriptor::SerialSettings,
    simulator: Simulator<D>,
) -> Result<JoinHandle<()>, SimulatorError> {
    let builder = crate::transport::serial_builder(settings);
    let serial_stream =
        tokio_serial::SerialStream::open(&builder).map_err(|source| SimulatorError::Serial {
            path: settings.path.clone(),
            source: source.into(),
        })?;
    let server = server::rtu::Server::new(serial_stream);

    info!("Simulator serving RTU on {}", settings.path);
    Ok(tokio::spawn(async move {
        if let Err(err) = server.serve_forever(simulator).await {
            error!("Simulator server stopped: {err}");
        }
    }))
}

/// Update the device every `period`, first after one full period.
pub fn spawn_state_updates<D, F>(
    simulator: Simulator<D>,
    period: Duration,
    mut input: F,
) -> JoinHandle<()>
where
    D: Device + Send + 'static,
    F: FnMut() -> D::Input + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            simulator.tick(input());
        }
    })
}

/// Running simulator: the server task and the update task.
#[derive(Debug)]
pub struct SimulatorHandle<D> {
    simulator: Simulator<D>,
    local_addr: Option<SocketAddr>,
    server: JoinHandle<()>,
    updates: JoinHandle<()>,
}

impl<D: Device> SimulatorHandle<D> {
    pub fn new(
        simulator: Simulator<D>,
        local_addr: Option<SocketAddr>,
        server: JoinHandle<()>,
        updates: JoinHandle<()>,
    ) -> Self {
        Self {
            simulator,
            local_addr,
            server,
            updates,
        }
    }

    pub fn simulator(&self) -> &Simulator<D> {
        &self.simulator
    }

    /// Bound TCP address, `None` when serving over a serial line.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Abort both tasks and wait for them to finish.
    pub async fn stop(self) {
        self.server.abort();
        self.updates.abort();
        // Cancellation is the expected outcome.
        let _ = self.server.await;
        let _ = self.updates.await;
        info!("Simulator stopped");
    }
}
