/*!
Transport contract.

The codec never touches the wire itself. Byte transmission, the address mark
on the first byte, and timed reception belong to a [`Transport`] supplied by
the caller.
*/

use std::time::Duration;

use thiserror::Error;

/// Outcome of a failed transport operation
#[derive(Error, Debug)]
pub enum TransportError {
    /// No complete reply arrived within the timeout
    #[error("receive timed out")]
    Timeout,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Blocking byte transport to a chain of ASICs.
pub trait Transport {
    /// Select `address` on the bus and send `payload` as one complete frame.
    fn transmit(&mut self, address: u8, payload: &[u8]) -> Result<(), TransportError>;

    /// Fill `buf` with exactly `buf.len()` bytes, or fail.
    ///
    /// A partial read is never a success. Running out of time must be
    /// reported as [`TransportError::Timeout`].
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit(&mut self, address: u8, payload: &[u8]) -> Result<(), TransportError> {
        (**self).transmit(address, payload)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).receive(buf, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, address: u8, payload: &[u8]) -> Result<(), TransportError> {
        (**self).transmit(address, payload)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).receive(buf, timeout)
    }
}
