//! Transport contract
//!
//! The engine never opens or configures ports itself. It asks a
//! [`PortProvider`] for a [`Transport`] by port identifier at initialization
//! and drops it at shutdown.

use std::time::Instant;
use thiserror::Error;

/// Errors reported by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing arrived before the deadline
    #[error("Read timed out")]
    Timeout,

    /// I/O failure, or the port could not be opened
    #[error("Port error: {0}")]
    Port(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout
            }
            _ => TransportError::Port(e.to_string()),
        }
    }
}

/// Byte-oriented link to a device. Bytes arrive in the order sent.
pub trait Transport: Send {
    /// Write all of `bytes`
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read a single byte, giving up with [`TransportError::Timeout`] once
    /// `deadline` has passed
    fn read_byte(&mut self, deadline: Instant) -> Result<u8, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read_byte(&mut self, deadline: Instant) -> Result<u8, TransportError> {
        (**self).read_byte(deadline)
    }
}

/// Opens transports by port identifier
pub trait PortProvider: Send {
    /// Open `port`; the transport closes when dropped
    fn open(&mut self, port: &str) -> Result<Box<dyn Transport>, TransportError>;
}
