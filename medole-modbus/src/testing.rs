//! In-memory transport for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_modbus::{ExceptionCode, Request, Response};

use crate::catalog::REGISTERS;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Counters shared between a [`MockTransport`] and the test body.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    in_flight: Arc<AtomicBool>,
    pub overlaps: Arc<AtomicUsize>,
    pub requests: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl Probe {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub type Bank = Arc<Mutex<HashMap<u16, u16>>>;

/// Bank holding every catalog register, zeroed.
pub fn catalog_bank() -> Bank {
    Arc::new(Mutex::new(REGISTERS.iter().map(|r| (r.address, 0)).collect()))
}

struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Answers holding register requests from a shared bank.
pub struct MockTransport {
    pub probe: Probe,
    pub bank: Bank,
    pub delay: Duration,
    pub fail_open: bool,
    pub short_reads: bool,
    open: bool,
}

impl MockTransport {
    pub fn new(probe: Probe, bank: Bank) -> Self {
        Self {
            probe,
            bank,
            delay: Duration::ZERO,
            fail_open: false,
            short_reads: false,
            open: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn answer(&self, request: Request<'static>) -> Result<Response> {
        let mut bank = self.bank.lock().unwrap();
        match request {
            Request::ReadHoldingRegisters(addr, cnt) => {
                let mut words = (0..cnt)
                    .map(|i| bank.get(&(addr + i)).copied())
                    .collect::<Option<Vec<_>>>()
                    .ok_or(Error::Exception(ExceptionCode::IllegalDataAddress))?;
                if self.short_reads {
                    words.pop();
                }
                Ok(Response::ReadHoldingRegisters(words))
            }
            Request::WriteSingleRegister(addr, value) => {
                let slot = bank
                    .get_mut(&addr)
                    .ok_or(Error::Exception(ExceptionCode::IllegalDataAddress))?;
                *slot = value;
                Ok(Response::WriteSingleRegister(addr, value))
            }
            Request::WriteMultipleRegisters(addr, values) => {
                for (i, value) in values.iter().enumerate() {
                    let slot = bank
                        .get_mut(&(addr + i as u16))
                        .ok_or(Error::Exception(ExceptionCode::IllegalDataAddress))?;
                    *slot = *value;
                }
                Ok(Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            _ => Err(Error::Exception(ExceptionCode::IllegalFunction)),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(Error::Connect {
                endpoint: "mock".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.open = true;
        Ok(())
    }

    async fn request(&mut self, request: Request<'static>) -> Result<Response> {
        assert!(self.open, "request on a closed transport");
        self.probe.requests.fetch_add(1, Ordering::SeqCst);
        if self.probe.in_flight.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        // Cleared on drop, so a request cancelled by a timeout still ends.
        let _in_flight = InFlight(self.probe.in_flight.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer(request)
    }

    async fn close(&mut self) {
        if self.open {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
