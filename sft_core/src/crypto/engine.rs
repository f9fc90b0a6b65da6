//! Per-connection crypto engine: session-key lifecycle, AEAD envelopes,
//! hybrid session-key wrapping, integrity hashing and metadata signatures.
//!
//! The protocol is hybrid: one asymmetric operation per transfer (wrapping
//! the session key under the peer's X25519 key) and fast symmetric
//! AES-256-GCM for the bulk payload.

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce as AesNonce,
    aead::{Aead, KeyInit},
};
use ed25519_dalek::{Signature, Signer, Verifier};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

use super::keys::{Identity, PublicKeyBundle};

/// Size of the AES-256-GCM session key in bytes (256 bits)
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Wire size of a wrapped session key:
/// ephemeral X25519 public key ‖ nonce ‖ sealed key (key + tag)
pub const WRAPPED_KEY_SIZE: usize = 32 + NONCE_SIZE + SESSION_KEY_SIZE + TAG_SIZE;

/// HKDF info label binding derived wrap keys to this protocol
const WRAP_INFO: &[u8] = b"sft-session-key-wrap-v1";

/// A per-transfer symmetric key. Never persisted, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionKey([u8; SESSION_KEY_SIZE]);

/// One AEAD encryption result: fresh nonce, ciphertext, and the
/// authentication tag, which is always the trailing [`TAG_SIZE`] bytes of
/// the AEAD output. Keeping the split in exactly one place avoids the
/// classic fragility of re-splicing tag and ciphertext at serialization
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; NONCE_SIZE],
    pub cipher: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl Envelope {
    /// Split raw AEAD output (ciphertext with trailing tag) into an envelope
    pub fn from_sealed(nonce: [u8; NONCE_SIZE], sealed: Vec<u8>) -> Result<Self> {
        if sealed.len() < TAG_SIZE {
            return Err(Error::Encryption(
                "AEAD output shorter than the authentication tag".to_string(),
            ));
        }
        let mut cipher = sealed;
        let tag_bytes = cipher.split_off(cipher.len() - TAG_SIZE);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&tag_bytes);
        Ok(Self { nonce, cipher, tag })
    }

    /// Recombine ciphertext and tag into the form the AEAD expects
    pub fn sealed_bytes(&self) -> Vec<u8> {
        let mut sealed = Vec::with_capacity(self.cipher.len() + TAG_SIZE);
        sealed.extend_from_slice(&self.cipher);
        sealed.extend_from_slice(&self.tag);
        sealed
    }
}

/// SHA-512 integrity hash over the exact concatenation
/// `nonce ‖ ciphertext ‖ tag`, no delimiters, as lowercase hex.
pub fn hash_envelope(envelope: &Envelope) -> String {
    let mut hasher = Sha512::new();
    hasher.update(envelope.nonce);
    hasher.update(&envelope.cipher);
    hasher.update(envelope.tag);
    hex::encode(hasher.finalize())
}

/// Verify an Ed25519 signature over `message` against the peer's bundle.
/// Any failure (bad key, bad signature length, mismatch) returns `false`.
pub fn verify(message: &[u8], signature: &[u8], bundle: &PublicKeyBundle) -> bool {
    let Ok(verifying_key) = bundle.verifying_key() else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &sig).is_ok()
}

/// Per-connection crypto state: a shared long-lived identity plus the
/// current (optional) session key. One engine per session, never shared
/// across connections.
pub struct CryptoEngine {
    identity: Arc<Identity>,
    session_key: Option<SessionKey>,
}

impl CryptoEngine {
    pub fn new(identity: Arc<Identity>) -> Self {
        Self {
            identity,
            session_key: None,
        }
    }

    /// Public halves of the engine's identity
    pub fn public_bundle(&self) -> PublicKeyBundle {
        self.identity.public_bundle()
    }

    /// Generate a fresh random 256-bit session key, replacing any prior one
    pub fn generate_session_key(&mut self) {
        let mut key = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        self.session_key = Some(SessionKey(key));
    }

    /// Encrypt the current session key under the peer's X25519 public key.
    ///
    /// Sealed-box construction: an ephemeral X25519 keypair is generated,
    /// its shared secret with the peer is run through HKDF-SHA256 (salted
    /// with the ephemeral public key), and the session key is sealed with
    /// AES-256-GCM under the derived key. Output:
    /// `ephemeral_pk ‖ nonce ‖ sealed_key`.
    pub fn wrap_session_key(&self, peer: &PublicKeyBundle) -> Result<Vec<u8>> {
        let key = self
            .session_key
            .as_ref()
            .ok_or_else(|| Error::Encryption("no session key to wrap".to_string()))?;

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_pk = X25519PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&peer.x25519_public());
        let wrap_key = derive_wrap_key(shared.as_bytes(), ephemeral_pk.as_bytes())?;

        let aead = Aes256Gcm::new_from_slice(&wrap_key)
            .map_err(|e| Error::Encryption(format!("invalid wrap key: {}", e)))?;
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let sealed = aead
            .encrypt(AesNonce::from_slice(&nonce), key.0.as_slice())
            .map_err(|_| Error::Encryption("session key wrap failed".to_string()))?;

        let mut wrapped = Vec::with_capacity(WRAPPED_KEY_SIZE);
        wrapped.extend_from_slice(ephemeral_pk.as_bytes());
        wrapped.extend_from_slice(&nonce);
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    /// Inverse of [`wrap_session_key`] using this engine's private key.
    /// On success the unwrapped key becomes the engine's session key.
    /// Fails with an auth error when the ciphertext was not wrapped for
    /// this identity.
    ///
    /// [`wrap_session_key`]: CryptoEngine::wrap_session_key
    pub fn unwrap_session_key(&mut self, wrapped: &[u8]) -> Result<()> {
        if wrapped.len() != WRAPPED_KEY_SIZE {
            return Err(Error::Auth(format!(
                "wrapped session key has {} bytes, expected {}",
                wrapped.len(),
                WRAPPED_KEY_SIZE
            )));
        }

        let mut ephemeral_pk = [0u8; 32];
        ephemeral_pk.copy_from_slice(&wrapped[..32]);
        let shared = self
            .identity
            .static_secret()
            .diffie_hellman(&X25519PublicKey::from(ephemeral_pk));
        let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_pk)?;

        let aead = Aes256Gcm::new_from_slice(&wrap_key)
            .map_err(|e| Error::Auth(format!("invalid wrap key: {}", e)))?;
        let plain = aead
            .decrypt(
                AesNonce::from_slice(&wrapped[32..32 + NONCE_SIZE]),
                &wrapped[32 + NONCE_SIZE..],
            )
            .map_err(|_| Error::Auth("session key unwrap failed".to_string()))?;

        let key: [u8; SESSION_KEY_SIZE] = plain
            .try_into()
            .map_err(|_| Error::Auth("unwrapped session key has the wrong length".to_string()))?;
        self.session_key = Some(SessionKey(key));
        Ok(())
    }

    /// Encrypt a payload under the session key with a fresh random nonce.
    ///
    /// Generates a session key automatically when none has been set yet,
    /// as a caller convenience; callers that need a specific key must call
    /// [`generate_session_key`] or [`unwrap_session_key`] first.
    ///
    /// [`generate_session_key`]: CryptoEngine::generate_session_key
    /// [`unwrap_session_key`]: CryptoEngine::unwrap_session_key
    pub fn aead_encrypt(&mut self, plaintext: &[u8]) -> Result<Envelope> {
        if self.session_key.is_none() {
            self.generate_session_key();
        }
        let key = self
            .session_key
            .as_ref()
            .ok_or_else(|| Error::Encryption("no session key".to_string()))?;

        let aead = Aes256Gcm::new_from_slice(&key.0)
            .map_err(|e| Error::Encryption(format!("invalid session key: {}", e)))?;
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let sealed = aead
            .encrypt(AesNonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Encryption("AEAD encryption failed".to_string()))?;

        Envelope::from_sealed(nonce, sealed)
    }

    /// Decrypt an envelope under the session key.
    ///
    /// A failed authentication tag surfaces as [`Error::Decryption`],
    /// distinct from decode failures, so handlers can report it as an
    /// integrity violation.
    pub fn aead_decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let key = self
            .session_key
            .as_ref()
            .ok_or_else(|| Error::Decryption("no session key".to_string()))?;

        let aead = Aes256Gcm::new_from_slice(&key.0)
            .map_err(|e| Error::Decryption(format!("invalid session key: {}", e)))?;
        let sealed = envelope.sealed_bytes();
        aead.decrypt(AesNonce::from_slice(&envelope.nonce), sealed.as_slice())
            .map_err(|_| Error::Decryption("authentication tag mismatch".to_string()))
    }

    /// Ed25519 signature over `message` with this identity's signing key
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.identity.signing_key().sign(message).to_bytes().to_vec()
    }
}

/// HKDF-SHA256 derivation of an AES-256 wrap key from a DH shared secret,
/// salted with the ephemeral public key that produced it
fn derive_wrap_key(shared_secret: &[u8; 32], ephemeral_pk: &[u8; 32]) -> Result<[u8; 32]> {
    let hkdf = hkdf::Hkdf::<Sha256>::new(Some(ephemeral_pk.as_slice()), shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(WRAP_INFO, &mut key)
        .map_err(|_| Error::Encryption("HKDF expansion failed".to_string()))?;
    Ok(key)
}
