//! Cryptographic core: long-lived identities, per-connection engines,
//! AEAD envelopes, hybrid session-key wrapping, SHA-512 integrity hashing
//! and Ed25519 metadata signatures.

pub mod engine;
pub mod keys;

pub use engine::{
    CryptoEngine, Envelope, NONCE_SIZE, SESSION_KEY_SIZE, TAG_SIZE, WRAPPED_KEY_SIZE,
    hash_envelope, verify,
};
pub use keys::{Identity, PublicKeyBundle};
