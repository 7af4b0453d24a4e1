use crate::message::Refuse;
use crate::transport::TransportError;
use std::array::TryFromSliceError;
use thiserror::Error;

/// The primary error type for the `ufcs-lib` library.
#[derive(Error, Debug)]
pub enum UfcsError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timed out waiting for the adapter")]
    Timeout,

    #[error("Adapter answered with NACK")]
    Nack,

    #[error("Protocol mismatch in {field}: expected {expected}, got {actual}")]
    ProtocolMismatch {
        field: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("Message type mismatch: expected {expected}, got {actual}")]
    NotMatch { expected: u8, actual: u8 },

    #[error("Adapter refused the request: {0}")]
    Refused(Refuse),

    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Payload of {len} bytes exceeds the {max} byte buffer")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Exchange for {message} failed after {attempts} attempts: {last}")]
    ExchangeFailed {
        message: String,
        attempts: u8,
        last: Box<UfcsError>,
    },

    #[error("Adapter detection failed: {0}")]
    DetectFail(String),

    #[error("No UFCS adapter present")]
    NoAdapter,

    #[error("Output mode {0} is outside the valid range")]
    InvalidOutputMode(u8),

    #[error("Output mode {mode} has no capability entry ({available} received)")]
    CapabilityIndex { mode: u8, available: usize },

    #[error("Value {value} does not fit field {field}")]
    ValueOutOfRange { field: &'static str, value: i64 },

    #[error("Unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("Unknown command {cmd:#04x} for message type {msg_type}")]
    UnknownCommand { msg_type: u8, cmd: u8 },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("No transport registered")]
    NotRegistered,

    #[error("A transport for chip {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Chip {0} is not supported")]
    UnsupportedChip(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UfcsError {
    /// Whether a resend of the identical message may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, UfcsError::Timeout | UfcsError::Nack)
    }

    /// Whether the adapter declined with a Refuse message
    pub fn is_refused(&self) -> bool {
        matches!(self, UfcsError::Refused(_))
    }

    /// The decoded Refuse payload, if the adapter declined
    pub fn refusal(&self) -> Option<&Refuse> {
        match self {
            UfcsError::Refused(refuse) => Some(refuse),
            _ => None,
        }
    }
}

impl From<TryFromSliceError> for UfcsError {
    fn from(_: TryFromSliceError) -> Self {
        UfcsError::InvalidPacket("Failed to convert slice to array".to_string())
    }
}

pub type Result<T> = std::result::Result<T, UfcsError>;
