//! Wire data model for the single request/response exchange.
//!
//! Every message on the wire is JSON inside one frame. Binary fields travel
//! as base64; the integrity hash as lowercase hex. Metadata signatures are
//! computed over a canonical serialization (sorted keys) so verification is
//! reproducible regardless of construction order.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{Envelope, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, ErrorKind, Result};

/// File metadata carried by requests and download responses.
/// Download requests omit `size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub timestamp: u64,
}

impl Metadata {
    /// Canonical, byte-stable serialization: JSON with keys in sorted
    /// order and absent fields omitted. Signatures are computed over
    /// exactly these bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut map = BTreeMap::new();
        map.insert("filename", Value::from(self.filename.clone()));
        if let Some(size) = self.size {
            map.insert("size", Value::from(size));
        }
        map.insert("timestamp", Value::from(self.timestamp));
        Ok(serde_json::to_vec(&map)?)
    }
}

/// Seconds since the Unix epoch, for request/response metadata
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The encrypted payload bundle: envelope fields as base64, the SHA-512
/// integrity hash as hex, and the metadata signature as base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub nonce: String,
    pub cipher: String,
    pub tag: String,
    pub hash: String,
    pub sig: String,
}

impl Packet {
    pub fn new(envelope: &Envelope, hash: String, signature: &[u8]) -> Self {
        Self {
            nonce: BASE64.encode(envelope.nonce),
            cipher: BASE64.encode(&envelope.cipher),
            tag: BASE64.encode(envelope.tag),
            hash,
            sig: BASE64.encode(signature),
        }
    }

    /// Decode the envelope fields back into binary form
    pub fn envelope(&self) -> Result<Envelope> {
        let nonce: [u8; NONCE_SIZE] = decode_b64(&self.nonce, "nonce")?
            .try_into()
            .map_err(|_| Error::Protocol(format!("nonce must be {} bytes", NONCE_SIZE)))?;
        let cipher = decode_b64(&self.cipher, "cipher")?;
        let tag: [u8; TAG_SIZE] = decode_b64(&self.tag, "tag")?
            .try_into()
            .map_err(|_| Error::Protocol(format!("tag must be {} bytes", TAG_SIZE)))?;
        Ok(Envelope { nonce, cipher, tag })
    }

    pub fn signature(&self) -> Result<Vec<u8>> {
        decode_b64(&self.sig, "signature")
    }
}

/// Decoded client request, dispatched by the `type` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Upload {
        packet: Packet,
        metadata: Metadata,
        encrypted_session_key: String,
        client_public_key: String,
    },
    Download {
        metadata: Metadata,
        signature: String,
        client_public_key: String,
    },
}

/// Server response, dispatched by the `status` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ACK")]
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        packet: Option<Packet>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encrypted_session_key: Option<String>,
    },
    #[serde(rename = "NACK")]
    Nack { error: ErrorKind, message: String },
    #[serde(rename = "error")]
    Error { message: String },
}

impl Response {
    pub fn ack(message: impl Into<String>) -> Self {
        Response::Ack {
            message: Some(message.into()),
            packet: None,
            metadata: None,
            encrypted_session_key: None,
        }
    }

    pub fn nack(error: ErrorKind, message: impl Into<String>) -> Self {
        Response::Nack {
            error,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

pub fn encode_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_b64(text: &str, what: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| Error::Protocol(format!("invalid base64 {}: {}", what, e)))
}
