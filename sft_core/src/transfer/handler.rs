//! Server-side request handling: the ordered verification pipelines for
//! upload and download.
//!
//! Upload order matters: cheap hash comparison before signature
//! verification before AEAD decryption, so corrupted input is rejected as
//! early as possible and untrusted ciphertext is never decrypted first.
//! Every failure becomes a structured NACK; nothing here can take down the
//! accept loop.

use crate::crypto::{self, CryptoEngine, PublicKeyBundle, hash_envelope};
use crate::error::{Error, ErrorKind, Result};
use crate::storage::FileStore;

use super::protocol::{
    Metadata, Packet, Request, Response, decode_b64, encode_b64, unix_timestamp,
};

/// Dispatch one decoded request and produce the response to frame back
pub async fn handle_request(
    request: Request,
    engine: &mut CryptoEngine,
    store: &FileStore,
) -> Response {
    match request {
        Request::Upload {
            packet,
            metadata,
            encrypted_session_key,
            client_public_key,
        } => {
            let filename = metadata.filename.clone();
            match handle_upload(
                engine,
                store,
                packet,
                metadata,
                &encrypted_session_key,
                &client_public_key,
            )
            .await
            {
                Ok(()) => {
                    tracing::info!("upload accepted: {}", filename);
                    Response::ack("upload complete")
                }
                Err(e) => {
                    tracing::warn!("upload rejected for {}: {}", filename, e);
                    failure_response(e)
                }
            }
        }
        Request::Download {
            metadata,
            signature,
            client_public_key,
        } => {
            let filename = metadata.filename.clone();
            match handle_download(engine, store, metadata, &signature, &client_public_key).await {
                Ok(response) => {
                    tracing::info!("download served: {}", filename);
                    response
                }
                Err(e) => {
                    tracing::warn!("download rejected for {}: {}", filename, e);
                    failure_response(e)
                }
            }
        }
    }
}

/// Map a handler failure to its NACK; failures without a wire kind
/// (I/O, decode) are reported as internal server errors
fn failure_response(e: Error) -> Response {
    match e.kind() {
        Some(kind) => Response::nack(kind, e.to_string()),
        None => Response::nack(ErrorKind::Server, e.to_string()),
    }
}

async fn handle_upload(
    engine: &mut CryptoEngine,
    store: &FileStore,
    packet: Packet,
    metadata: Metadata,
    encrypted_session_key: &str,
    client_public_key: &str,
) -> Result<()> {
    // 1. Unwrap the session key with our private key
    let wrapped = decode_b64(encrypted_session_key, "wrapped session key")
        .map_err(|_| Error::Auth("wrapped session key is not valid base64".to_string()))?;
    engine.unwrap_session_key(&wrapped)?;

    // 2. Recompute the integrity hash and compare before anything else
    let envelope = packet.envelope()?;
    if hash_envelope(&envelope) != packet.hash {
        return Err(Error::Integrity("envelope hash mismatch".to_string()));
    }

    // 3. Verify the metadata signature with the sender's declared key
    let bundle = PublicKeyBundle::import(client_public_key)
        .map_err(|e| Error::Auth(e.to_string()))?;
    let signature = packet.signature()
        .map_err(|_| Error::Auth("signature is not valid base64".to_string()))?;
    if !crypto::verify(&metadata.canonical_bytes()?, &signature, &bundle) {
        return Err(Error::Auth(
            "metadata signature verification failed".to_string(),
        ));
    }

    // 4. + 5. AEAD tag verification happens as part of decryption; only a
    // fully verified payload reaches the store
    let plaintext = engine.aead_decrypt(&envelope)?;
    store.write(&metadata.filename, &plaintext).await?;
    Ok(())
}

async fn handle_download(
    engine: &mut CryptoEngine,
    store: &FileStore,
    metadata: Metadata,
    signature: &str,
    client_public_key: &str,
) -> Result<Response> {
    // No signature, no file
    let bundle = PublicKeyBundle::import(client_public_key)
        .map_err(|e| Error::Auth(e.to_string()))?;
    let sig = decode_b64(signature, "signature")
        .map_err(|_| Error::Auth("signature is not valid base64".to_string()))?;
    if !crypto::verify(&metadata.canonical_bytes()?, &sig, &bundle) {
        return Err(Error::Auth(
            "download request signature verification failed".to_string(),
        ));
    }

    let plaintext = store.read(&metadata.filename).await?;

    // Fresh session key per transfer, wrapped under the requester's key
    engine.generate_session_key();
    let envelope = engine.aead_encrypt(&plaintext)?;
    let hash = hash_envelope(&envelope);

    let response_metadata = Metadata {
        filename: metadata.filename,
        size: Some(plaintext.len() as u64),
        timestamp: unix_timestamp(),
    };
    let response_signature = engine.sign(&response_metadata.canonical_bytes()?);
    let wrapped = engine.wrap_session_key(&bundle)?;

    Ok(Response::Ack {
        message: None,
        packet: Some(Packet::new(&envelope, hash, &response_signature)),
        metadata: Some(response_metadata),
        encrypted_session_key: Some(encode_b64(&wrapped)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;
    use std::sync::Arc;

    fn server_parts() -> (CryptoEngine, Arc<Identity>) {
        let identity = Arc::new(Identity::generate());
        (CryptoEngine::new(identity.clone()), identity)
    }

    /// Build a valid upload request the way the client does
    fn build_upload(
        server_bundle: &PublicKeyBundle,
        filename: &str,
        payload: &[u8],
    ) -> (Request, CryptoEngine) {
        let client_identity = Arc::new(Identity::generate());
        let mut client_engine = CryptoEngine::new(client_identity);

        client_engine.generate_session_key();
        let envelope = client_engine.aead_encrypt(payload).unwrap();
        let hash = hash_envelope(&envelope);
        let metadata = Metadata {
            filename: filename.to_string(),
            size: Some(payload.len() as u64),
            timestamp: unix_timestamp(),
        };
        let signature = client_engine.sign(&metadata.canonical_bytes().unwrap());
        let wrapped = client_engine.wrap_session_key(server_bundle).unwrap();

        let request = Request::Upload {
            packet: Packet::new(&envelope, hash, &signature),
            metadata,
            encrypted_session_key: encode_b64(&wrapped),
            client_public_key: client_engine.public_bundle().export(),
        };
        (request, client_engine)
    }

    #[tokio::test]
    async fn test_upload_persists_verified_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let (mut engine, identity) = server_parts();

        let (request, _) = build_upload(&identity.public_bundle(), "song.mp3", b"audio");
        let response = handle_request(request, &mut engine, &store).await;

        assert!(matches!(response, Response::Ack { .. }), "got {:?}", response);
        assert_eq!(store.read("song.mp3").await.unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_upload_with_corrupted_cipher_is_integrity_nack() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let (mut engine, identity) = server_parts();

        let (mut request, _) = build_upload(&identity.public_bundle(), "song.mp3", b"audio");
        if let Request::Upload { packet, .. } = &mut request {
            // Corrupt the ciphertext without recomputing hash or signature
            let mut cipher = decode_b64(&packet.cipher, "cipher").unwrap();
            cipher[0] ^= 0xFF;
            packet.cipher = encode_b64(&cipher);
        }

        let response = handle_request(request, &mut engine, &store).await;
        assert!(
            matches!(
                response,
                Response::Nack {
                    error: ErrorKind::Integrity,
                    ..
                }
            ),
            "got {:?}",
            response
        );
        assert!(!store.contains("song.mp3").await);
    }

    #[tokio::test]
    async fn test_upload_with_foreign_signature_is_auth_nack() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let (mut engine, identity) = server_parts();

        let (mut request, _) = build_upload(&identity.public_bundle(), "song.mp3", b"audio");
        if let Request::Upload {
            client_public_key, ..
        } = &mut request
        {
            // Claim a different sender than the one who signed
            *client_public_key = Identity::generate().public_bundle().export();
        }

        let response = handle_request(request, &mut engine, &store).await;
        assert!(
            matches!(
                response,
                Response::Nack {
                    error: ErrorKind::Auth,
                    ..
                }
            ),
            "got {:?}",
            response
        );
    }

    #[tokio::test]
    async fn test_download_of_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let (mut engine, _) = server_parts();

        let client_engine = CryptoEngine::new(Arc::new(Identity::generate()));
        let metadata = Metadata {
            filename: "missing.mp3".to_string(),
            size: None,
            timestamp: unix_timestamp(),
        };
        let sig = client_engine.sign(&metadata.canonical_bytes().unwrap());
        let request = Request::Download {
            metadata,
            signature: encode_b64(&sig),
            client_public_key: client_engine.public_bundle().export(),
        };

        let response = handle_request(request, &mut engine, &store).await;
        assert!(
            matches!(
                response,
                Response::Nack {
                    error: ErrorKind::NotFound,
                    ..
                }
            ),
            "got {:?}",
            response
        );
    }

    #[tokio::test]
    async fn test_download_response_verifies_on_the_client_side() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.write("song.mp3", b"stored audio").await.unwrap();
        let (mut engine, server_identity) = server_parts();

        let client_identity = Arc::new(Identity::generate());
        let mut client_engine = CryptoEngine::new(client_identity);
        let metadata = Metadata {
            filename: "song.mp3".to_string(),
            size: None,
            timestamp: unix_timestamp(),
        };
        let sig = client_engine.sign(&metadata.canonical_bytes().unwrap());
        let request = Request::Download {
            metadata,
            signature: encode_b64(&sig),
            client_public_key: client_engine.public_bundle().export(),
        };

        let response = handle_request(request, &mut engine, &store).await;
        let Response::Ack {
            packet: Some(packet),
            metadata: Some(response_metadata),
            encrypted_session_key: Some(wrapped),
            ..
        } = response
        else {
            panic!("expected a full download ACK");
        };

        // Same four-step verification the client runs
        client_engine
            .unwrap_session_key(&decode_b64(&wrapped, "wrapped key").unwrap())
            .unwrap();
        let envelope = packet.envelope().unwrap();
        assert_eq!(hash_envelope(&envelope), packet.hash);
        assert!(crypto::verify(
            &response_metadata.canonical_bytes().unwrap(),
            &packet.signature().unwrap(),
            &server_identity.public_bundle()
        ));
        assert_eq!(
            client_engine.aead_decrypt(&envelope).unwrap(),
            b"stored audio"
        );
        assert_eq!(response_metadata.size, Some(12));
    }
}
