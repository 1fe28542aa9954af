use async_trait::async_trait;

use crate::catalog::Register;
use crate::codec::{Address, Quantity, Word};
use crate::error::Error;

/// Read access to holding registers.
#[async_trait]
pub trait RegisterReader: Send + Sync {
    async fn read_registers(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>, Error>;
}

/// Write access to holding registers.
#[async_trait]
pub trait RegisterWriter: Send + Sync {
    async fn write_register(&self, addr: Address, word: Word) -> Result<(), Error>;
    async fn write_registers(&self, addr: Address, words: &[Word]) -> Result<(), Error>;
}

/// The registers a type is mapped onto, in address order.
pub trait RegisterLayout {
    fn layout() -> Vec<Register>;
}

#[async_trait]
/// Define mapping between Modbus holding registers and the Self type
/// to create and update the type instance by reading values directly from holding registers,
/// or write the read-write values back to holding registers.
pub trait HoldingRegisterMap
where
    Self: Sized + Default + Send,
{
    async fn update_from_holding_registers(
        &mut self,
        client: &dyn RegisterReader,
    ) -> Result<(), Error>;

    async fn from_holding_registers(client: &dyn RegisterReader) -> Result<Self, Error> {
        let mut new = Self::default();
        new.update_from_holding_registers(client).await?;

        Ok(new)
    }

    /// Write every read-write field; read-only fields are skipped.
    async fn write_to_registers(&self, client: &dyn RegisterWriter) -> Result<(), Error>;
}
