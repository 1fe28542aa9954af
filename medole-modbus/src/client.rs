//! Serialized register access to one endpoint.
//!
//! Every operation runs the same cycle while holding the client lock: open
//! the link, exchange one request under the client timeout, close the link,
//! then check the response. The link is closed on every path, including
//! errors, timeouts and callers dropping the operation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_modbus::{Request, Response};

use crate::codec::{Address, Quantity, Word};
use crate::config::ClientSettings;
use crate::core::{RegisterReader, RegisterWriter};
use crate::descriptor::ConnectionDescriptor;
use crate::error::{Error, Result};
use crate::transport::{ModbusTransport, Transport};

/// Most registers one read request may carry.
pub const MAX_READ_COUNT: Quantity = 125;
/// Most registers one write-multiple request may carry.
pub const MAX_WRITE_COUNT: Quantity = 123;

/// Lock shared by every client of a [`crate::registry::LockScope::Global`] registry.
pub type SharedLock = Arc<Mutex<()>>;

pub struct DeviceClient {
    descriptor: ConnectionDescriptor,
    timeout: Duration,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    shared: Option<SharedLock>,
}

impl DeviceClient {
    pub fn new(descriptor: ConnectionDescriptor, settings: ClientSettings) -> Self {
        let transport = ModbusTransport::new(descriptor.clone(), settings.timeout());
        Self::with_transport(descriptor, settings, Box::new(transport))
    }

    /// Build a client over any [`Transport`].
    pub fn with_transport(
        descriptor: ConnectionDescriptor,
        settings: ClientSettings,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            descriptor,
            timeout: settings.timeout(),
            transport: Arc::new(Mutex::new(transport)),
            shared: None,
        }
    }

    /// Additionally serialize this client against every other holder of `lock`.
    pub fn with_shared_lock(mut self, lock: SharedLock) -> Self {
        self.shared = Some(lock);
        self
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn read_registers(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        check_count(cnt, MAX_READ_COUNT)?;
        match self
            .execute(Request::ReadHoldingRegisters(addr, cnt))
            .await?
        {
            Response::ReadHoldingRegisters(words) if words.len() == cnt as usize => Ok(words),
            Response::ReadHoldingRegisters(words) => Err(self.decode_failure(Error::RegisterCount {
                address: addr,
                expected: cnt as usize,
                actual: words.len(),
            })),
            other => Err(self.decode_failure(unexpected(&other))),
        }
    }

    pub async fn read_register(&self, addr: Address) -> Result<Word> {
        let words = self.read_registers(addr, 1).await?;
        Ok(words[0])
    }

    pub async fn write_register(&self, addr: Address, word: Word) -> Result<()> {
        match self
            .execute(Request::WriteSingleRegister(addr, word))
            .await?
        {
            Response::WriteSingleRegister(a, w) if a == addr && w == word => Ok(()),
            other => Err(self.decode_failure(unexpected(&other))),
        }
    }

    pub async fn write_registers(&self, addr: Address, words: &[Word]) -> Result<()> {
        check_count(words.len().try_into().unwrap_or(Quantity::MAX), MAX_WRITE_COUNT)?;
        let cnt = words.len() as Quantity;
        match self
            .execute(Request::WriteMultipleRegisters(addr, words.to_vec().into()))
            .await?
        {
            Response::WriteMultipleRegisters(a, n) if a == addr && n == cnt => Ok(()),
            other => Err(self.decode_failure(unexpected(&other))),
        }
    }

    async fn execute(&self, request: Request<'static>) -> Result<Response> {
        let shared = match &self.shared {
            Some(lock) => Some(lock.clone().lock_owned().await),
            None => None,
        };
        let mut link = LinkGuard {
            transport: Some(self.transport.clone().lock_owned().await),
            shared,
        };

        let result = match link.transport.as_deref_mut() {
            Some(transport) => self.exchange(&mut **transport, request).await,
            None => Err(Error::NotConnected),
        };
        link.close().await;

        result.inspect_err(|err| warn!("{}: {err}", self.descriptor))
    }

    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        request: Request<'static>,
    ) -> Result<Response> {
        debug!("{}: {request:?}", self.descriptor);
        transport.open().await?;
        match tokio::time::timeout(self.timeout, transport.request(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    fn decode_failure(&self, err: Error) -> Error {
        warn!("{}: {err}", self.descriptor);
        err
    }
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("descriptor", &self.descriptor)
            .field("timeout", &self.timeout)
            .field("shared_lock", &self.shared.is_some())
            .finish()
    }
}

/// The locks held for one operation.
///
/// If dropped before [`LinkGuard::close`], the link is closed on a spawned
/// task which releases the locks once done.
struct LinkGuard {
    transport: Option<OwnedMutexGuard<Box<dyn Transport>>>,
    shared: Option<OwnedMutexGuard<()>>,
}

impl LinkGuard {
    async fn close(mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        let shared = self.shared.take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    transport.close().await;
                    drop(shared);
                });
            }
            Err(_) => warn!("Cancelled operation left its link open: no runtime to close it"),
        }
    }
}

fn check_count(cnt: Quantity, max: Quantity) -> Result<()> {
    if cnt == 0 || cnt > max {
        return Err(Error::InvalidRequest(format!(
            "register count {cnt} outside 1..={max}"
        )));
    }
    Ok(())
}

fn unexpected(response: &Response) -> Error {
    Error::UnexpectedResponse(format!("{response:?}"))
}

#[async_trait]
impl RegisterReader for DeviceClient {
    async fn read_registers(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        DeviceClient::read_registers(self, addr, cnt).await
    }
}

#[async_trait]
impl RegisterWriter for DeviceClient {
    async fn write_register(&self, addr: Address, word: Word) -> Result<()> {
        DeviceClient::write_register(self, addr, word).await
    }

    async fn write_registers(&self, addr: Address, words: &[Word]) -> Result<()> {
        DeviceClient::write_registers(self, addr, words).await
    }
}
