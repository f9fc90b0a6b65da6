//! Identity key material: a long-lived Ed25519 signing keypair plus an
//! X25519 key-agreement keypair, generated together once per process and
//! shared read-only across connections. Private halves never leave the
//! process; public halves travel as a portable JSON encoding.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// Long-lived identity keypair.
///
/// Creation is an explicit initialization step, not a constructor side
/// effect: clients and servers generate one `Identity` at startup and hand
/// an `Arc` of it to every session they open.
pub struct Identity {
    signing: SigningKey,
    encryption: StaticSecret,
}

impl Identity {
    /// Generate a fresh identity from the OS random number generator
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            encryption: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// The exportable public halves of this identity
    pub fn public_bundle(&self) -> PublicKeyBundle {
        PublicKeyBundle {
            signing: self.signing.verifying_key().to_bytes(),
            encryption: X25519PublicKey::from(&self.encryption).to_bytes(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub(crate) fn static_secret(&self) -> &StaticSecret {
        &self.encryption
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print private key material
        f.debug_struct("Identity")
            .field("public", &self.public_bundle())
            .finish()
    }
}

/// Portable public-key encoding: hex-encoded Ed25519 verifying key and
/// X25519 public key, serialized as a small JSON object. This is what the
/// server pushes after the handshake and what requests carry as
/// `client_public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBundle {
    /// Ed25519 verifying key (32 bytes, hex)
    #[serde(with = "hex_bytes_32")]
    pub signing: [u8; 32],
    /// X25519 public key (32 bytes, hex)
    #[serde(with = "hex_bytes_32")]
    pub encryption: [u8; 32],
}

impl PublicKeyBundle {
    /// Encode as the portable textual form sent on the wire
    pub fn export(&self) -> String {
        // Two fixed hex fields cannot fail to serialize
        serde_json::to_string(self).expect("public key bundle serializes")
    }

    /// Parse the portable textual form received from a peer
    pub fn import(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::InvalidKey(format!("unparseable public key bundle: {}", e)))
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signing)
            .map_err(|e| Error::InvalidKey(format!("invalid signing key: {}", e)))
    }

    pub(crate) fn x25519_public(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.encryption)
    }
}

/// Serde helper for 32-byte arrays as hex strings
mod hex_bytes_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes of key material"))
    }
}
