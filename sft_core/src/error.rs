use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for all sft_core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kind carried by NACK responses on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Hash or AEAD tag did not verify
    Integrity,
    /// Signature or session-key unwrap failed
    Auth,
    /// Requested file does not exist in the store
    NotFound,
    /// Internal failure while handling the request
    Server,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Integrity => write!(f, "integrity"),
            ErrorKind::Auth => write!(f, "auth"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Server => write!(f, "server"),
        }
    }
}

/// Crate-level error type.
///
/// Every failure class of the protocol has its own tagged variant so call
/// sites can match on the kind instead of parsing messages. Transport
/// failures are fatal to the connection; security failures map to NACK
/// responses and never take down the server.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level I/O failure (refused, reset, closed mid-frame)
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation that needs a live session was called without one
    #[error("not connected; call connect() first")]
    NotConnected,

    /// Peer rejected or garbled the handshake exchange
    #[error("handshake failed: {0}")]
    HandshakeRejected(String),

    /// Message could not be decoded as the expected structure
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Outgoing frame exceeds the maximum encodable size
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD tag verification failed during decryption
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Key material could not be parsed or has the wrong length
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Integrity hash mismatch
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Signature verification or session-key unwrap failure
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Requested file is not in the store
    #[error("not found: {0}")]
    NotFound(String),

    /// Peer reported an internal server failure
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// Wire kind for NACK responses; `None` for transport/protocol errors,
    /// which terminate the exchange instead of producing a NACK.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Integrity(_) | Error::Decryption(_) => Some(ErrorKind::Integrity),
            Error::Auth(_) => Some(ErrorKind::Auth),
            Error::NotFound(_) => Some(ErrorKind::NotFound),
            Error::Server(_) => Some(ErrorKind::Server),
            _ => None,
        }
    }

    /// Rebuild the tagged error a peer reported in a NACK response
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Integrity => Error::Integrity(message),
            ErrorKind::Auth => Error::Auth(message),
            ErrorKind::NotFound => Error::NotFound(message),
            ErrorKind::Server => Error::Server(message),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}
