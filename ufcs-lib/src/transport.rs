//! The byte channel to the adapter.
//!
//! A chip backend implements [`Transport`]; the session only ever talks to
//! the adapter through these primitives.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Conditions the host waits for after a send or before a receive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WaitFlags: u8 {
        const CRC_ERROR = 0x01;
        const PACKET_COMPLETE = 0x02;
        const DATA_READY = 0x04;
    }
}

/// Result of the chip-level adapter handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectOutcome {
    Succeeded,
    Failed,
    NotPresent,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Timed out waiting for {0:?}")]
    Timeout(WaitFlags),

    #[error("Transport not ready")]
    NotReady,
}

/// Synchronous primitives supplied by a protocol chip backend.
pub trait Transport {
    /// Chip name checked against the registry allow-list
    fn chip_name(&self) -> &str;

    fn detect_adapter(&mut self) -> Result<DetectOutcome, TransportError>;
    fn send_header(&mut self, header: &[u8; 4]) -> Result<(), TransportError>;
    fn send_body(&mut self, body: &[u8]) -> Result<(), TransportError>;
    fn end_send(&mut self, flags: WaitFlags) -> Result<(), TransportError>;
    /// Block until one of `flags` is observed or the chip's own timeout expires
    fn wait_ready(&mut self, flags: WaitFlags) -> Result<(), TransportError>;
    fn receive_header(&mut self, header: &mut [u8; 4]) -> Result<(), TransportError>;
    fn receive_body(&mut self, body: &mut [u8]) -> Result<(), TransportError>;
    fn end_receive(&mut self) -> Result<(), TransportError>;
    fn soft_reset_master(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn chip_name(&self) -> &str {
        (**self).chip_name()
    }

    fn detect_adapter(&mut self) -> Result<DetectOutcome, TransportError> {
        (**self).detect_adapter()
    }

    fn send_header(&mut self, header: &[u8; 4]) -> Result<(), TransportError> {
        (**self).send_header(header)
    }

    fn send_body(&mut self, body: &[u8]) -> Result<(), TransportError> {
        (**self).send_body(body)
    }

    fn end_send(&mut self, flags: WaitFlags) -> Result<(), TransportError> {
        (**self).end_send(flags)
    }

    fn wait_ready(&mut self, flags: WaitFlags) -> Result<(), TransportError> {
        (**self).wait_ready(flags)
    }

    fn receive_header(&mut self, header: &mut [u8; 4]) -> Result<(), TransportError> {
        (**self).receive_header(header)
    }

    fn receive_body(&mut self, body: &mut [u8]) -> Result<(), TransportError> {
        (**self).receive_body(body)
    }

    fn end_receive(&mut self) -> Result<(), TransportError> {
        (**self).end_receive()
    }

    fn soft_reset_master(&mut self) -> Result<(), TransportError> {
        (**self).soft_reset_master()
    }
}
