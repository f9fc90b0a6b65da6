//! Transfer client: the core's public entry points.
//!
//! A `Client` owns one long-lived identity and at most one live session.
//! `connect` performs the handshake and stores the server's public key;
//! `upload` and `download` then run exactly one framed request/response
//! exchange. The server closes after one response, so each operation
//! consumes the session and a new `connect` is needed for the next one.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::crypto::{self, CryptoEngine, Identity, PublicKeyBundle, hash_envelope};
use crate::error::{Error, Result};

use super::framing::{recv_frame, send_frame};
use super::handshake::{SessionState, client_handshake};
use super::protocol::{Metadata, Packet, Request, Response, decode_b64, encode_b64, unix_timestamp};

/// One established connection: framed stream, per-connection engine and
/// the peer's public key
struct Session {
    stream: TcpStream,
    engine: CryptoEngine,
    server_key: PublicKeyBundle,
}

/// Transfer client
pub struct Client {
    addr: String,
    identity: Arc<Identity>,
    state: SessionState,
    session: Option<Session>,
}

impl Client {
    /// Create a client with a fresh identity. The identity lives for the
    /// client's lifetime and is reused across connects.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_identity(addr, Arc::new(Identity::generate()))
    }

    /// Create a client around an existing identity
    pub fn with_identity(addr: impl Into<String>, identity: Arc<Identity>) -> Self {
        Self {
            addr: addr.into(),
            identity,
            state: SessionState::Disconnected,
            session: None,
        }
    }

    /// Public halves of this client's identity
    pub fn public_bundle(&self) -> PublicKeyBundle {
        self.identity.public_bundle()
    }

    /// Current position in the session state machine
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Ready && self.session.is_some()
    }

    /// Connect and run the handshake. On success the session holds the
    /// server's public key and is ready for one request.
    pub async fn connect(&mut self) -> Result<()> {
        self.state = SessionState::Connecting;
        let mut stream = match TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e.into());
            }
        };

        self.state = SessionState::Handshaking;
        let server_key = match client_handshake(&mut stream).await {
            Ok(key) => key,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        self.state = SessionState::Ready;
        tracing::info!("connected to {} and handshake complete", self.addr);
        self.session = Some(Session {
            stream,
            engine: CryptoEngine::new(self.identity.clone()),
            server_key,
        });
        Ok(())
    }

    /// Encrypt `bytes` under a fresh session key and upload them as
    /// `filename`.
    ///
    /// With `tamper` set, one ciphertext byte is corrupted after the hash
    /// and signature are computed. It is a client-side test hook proving the
    /// receiver rejects corrupted payloads; an ordinary peer cannot
    /// trigger it. A rejected upload surfaces as the matching tagged
    /// error (`Integrity`, `Auth`, ...).
    pub async fn upload(&mut self, bytes: &[u8], filename: &str, tamper: bool) -> Result<()> {
        let session = self.take_session()?;
        session.upload(bytes, filename, tamper).await
    }

    /// Download `filename`, verifying hash, signature and AEAD tag before
    /// returning the plaintext
    pub async fn download(&mut self, filename: &str) -> Result<Vec<u8>> {
        let session = self.take_session()?;
        session.download(filename).await
    }

    /// Close the current session, if any
    pub async fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        if let Some(mut session) = self.session.take() {
            let _ = session.stream.shutdown().await;
            tracing::info!("disconnected from {}", self.addr);
        }
    }

    /// Each exchange consumes the session: one handshake authorizes one
    /// request, and the server closes after responding
    fn take_session(&mut self) -> Result<Session> {
        self.state = SessionState::Disconnected;
        self.session.take().ok_or(Error::NotConnected)
    }
}

impl Session {
    async fn upload(mut self, bytes: &[u8], filename: &str, tamper: bool) -> Result<()> {
        // Fresh session key per transfer
        self.engine.generate_session_key();
        let mut envelope = self.engine.aead_encrypt(bytes)?;

        let metadata = Metadata {
            filename: filename.to_string(),
            size: Some(bytes.len() as u64),
            timestamp: unix_timestamp(),
        };
        let signature = self.engine.sign(&metadata.canonical_bytes()?);
        let hash = hash_envelope(&envelope);

        if tamper {
            tracing::warn!("tamper mode: corrupting one ciphertext byte of {}", filename);
            match envelope.cipher.first_mut() {
                Some(byte) => *byte ^= 0xFF,
                // Empty payload: no ciphertext bytes, corrupt the tag instead
                None => envelope.tag[0] ^= 0xFF,
            }
        }

        let wrapped = self.engine.wrap_session_key(&self.server_key)?;
        let request = Request::Upload {
            packet: Packet::new(&envelope, hash, &signature),
            metadata,
            encrypted_session_key: encode_b64(&wrapped),
            client_public_key: self.engine.public_bundle().export(),
        };

        match self.exchange(&request).await? {
            Response::Ack { .. } => Ok(()),
            Response::Nack { error, message } => Err(Error::from_kind(error, message)),
            Response::Error { message } => Err(Error::Protocol(message)),
        }
    }

    async fn download(mut self, filename: &str) -> Result<Vec<u8>> {
        let metadata = Metadata {
            filename: filename.to_string(),
            size: None,
            timestamp: unix_timestamp(),
        };
        let signature = self.engine.sign(&metadata.canonical_bytes()?);
        let request = Request::Download {
            metadata,
            signature: encode_b64(&signature),
            client_public_key: self.engine.public_bundle().export(),
        };

        let (packet, response_metadata, wrapped) = match self.exchange(&request).await? {
            Response::Ack {
                packet: Some(packet),
                metadata: Some(metadata),
                encrypted_session_key: Some(wrapped),
                ..
            } => (packet, metadata, wrapped),
            Response::Nack { error, message } => return Err(Error::from_kind(error, message)),
            Response::Error { message } => return Err(Error::Protocol(message)),
            Response::Ack { .. } => {
                return Err(Error::Protocol(
                    "download ACK is missing its payload".to_string(),
                ));
            }
        };

        // 1. Unwrap the fresh session key sealed for this identity
        let wrapped_bytes = decode_b64(&wrapped, "wrapped session key")
            .map_err(|_| Error::Auth("wrapped session key is not valid base64".to_string()))?;
        self.engine.unwrap_session_key(&wrapped_bytes)?;

        // 2. Integrity hash before anything else
        let envelope = packet.envelope()?;
        if hash_envelope(&envelope) != packet.hash {
            return Err(Error::Integrity("envelope hash mismatch".to_string()));
        }

        // 3. The server must have signed the response metadata
        let sig = packet
            .signature()
            .map_err(|_| Error::Auth("signature is not valid base64".to_string()))?;
        if !crypto::verify(&response_metadata.canonical_bytes()?, &sig, &self.server_key) {
            return Err(Error::Auth(
                "response signature verification failed".to_string(),
            ));
        }

        // 4. AEAD tag check is the decryption itself
        self.engine.aead_decrypt(&envelope)
    }

    /// Send one framed request, receive one framed response, then shut the
    /// stream down, since the connection is single-exchange by design
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let bytes = serde_json::to_vec(request)?;
        send_frame(&mut self.stream, &bytes).await?;
        let reply = recv_frame(&mut self.stream).await?;
        let response = serde_json::from_slice(&reply)?;
        let _ = self.stream.shutdown().await;
        Ok(response)
    }
}
