//! Secure file transfer core: one client, one server, one raw TCP byte
//! stream. Each connection authenticates with a one-shot handshake,
//! negotiates a fresh 256-bit session key via hybrid encryption, moves the
//! file payload under AES-256-GCM, and lets the receiver verify a SHA-512
//! integrity hash and an Ed25519 metadata signature before accepting
//! anything.

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod transfer;

pub use config::TransferConfig;
pub use crypto::{CryptoEngine, Identity, PublicKeyBundle};
pub use error::{Error, ErrorKind, Result};
pub use storage::FileStore;
pub use transfer::{Client, Server, SessionState, TRANSFER_PORT};
