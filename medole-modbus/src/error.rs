use std::time::Duration;

use tokio_modbus::ExceptionCode;

use crate::codec::{Address, CodecError};

/// Coarse failure class of a register operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The link could not be opened.
    Connection,
    /// The device answered with an exception, the exchange failed, or it timed out.
    Transaction,
    /// The response did not have the expected shape or content.
    Decode,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid connection descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connecting to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    #[error("transport is not open")]
    NotConnected,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("device responded with exception {0:?}")]
    Exception(ExceptionCode),
    #[error("modbus transport error: {0}")]
    Transport(#[from] tokio_modbus::Error),
    #[error("expected {expected} register(s) at {address:#06x}, got {actual}")]
    RegisterCount {
        address: Address,
        expected: usize,
        actual: usize,
    },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDescriptor(_) | Error::Connect { .. } | Error::ConnectTimeout { .. } => {
                ErrorKind::Connection
            }
            Error::NotConnected
            | Error::InvalidRequest(_)
            | Error::Timeout(_)
            | Error::Exception(_)
            | Error::Transport(_) => ErrorKind::Transaction,
            Error::RegisterCount { .. } | Error::UnexpectedResponse(_) | Error::Codec(_) => {
                ErrorKind::Decode
            }
        }
    }
}

impl From<ExceptionCode> for Error {
    fn from(exception: ExceptionCode) -> Self {
        Error::Exception(exception)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            Error::InvalidDescriptor("unit id 0".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Transaction
        );
        assert_eq!(
            Error::Exception(ExceptionCode::IllegalDataAddress).kind(),
            ErrorKind::Transaction
        );
        assert_eq!(
            Error::RegisterCount {
                address: 0x6101,
                expected: 1,
                actual: 0
            }
            .kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            Error::from(CodecError::TenthsOutOfRange(12)).kind(),
            ErrorKind::Decode
        );
    }
}
