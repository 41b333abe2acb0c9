//! Error types for LINX

use thiserror::Error;

use crate::PublicKey;

/// Core LINX errors
#[derive(Error, Debug)]
pub enum LinxError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown frame kind: {0:#04x}")]
    UnknownFrameKind(u8),

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    // Crypto errors
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid public key")]
    InvalidKey,

    #[error("Invalid signal payload: {0}")]
    Payload(String),

    // Topology errors
    #[error("No {pool} capacity left (limit {limit})")]
    Capacity { pool: &'static str, limit: usize },

    #[error("Pending connection to {0:?} timed out")]
    PendingTimeout(PublicKey),

    #[error("Peer connection failed: {0}")]
    TransportFailure(String),

    // Relay errors
    #[error("No mailbox registered for {0:?}")]
    RoutingMiss(PublicKey),

    #[error("Transport error: {0}")]
    TransportError(String),
}

impl LinxError {
    /// Steady-state errors that degrade to "connection not made".
    /// Only configuration errors are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinxError::Config(_))
    }
}

impl From<std::io::Error> for LinxError {
    fn from(e: std::io::Error) -> Self {
        LinxError::TransportError(e.to_string())
    }
}

/// Result type for LINX operations
pub type LinxResult<T> = Result<T, LinxError>;
