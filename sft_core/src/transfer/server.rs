//! TCP server: an explicit handle with a cancellable accept loop.
//!
//! One long-lived identity keypair is created at bind time and shared
//! read-only across connections; each connection runs in its own task with
//! its own crypto engine and session key. A connection performs the
//! handshake, one framed request/response exchange, and then closes.
//! Failures inside a connection never stop the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::TransferConfig;
use crate::crypto::{CryptoEngine, Identity, PublicKeyBundle};
use crate::error::Result;
use crate::storage::FileStore;

use super::framing::{recv_frame, send_frame};
use super::handler::handle_request;
use super::handshake::server_handshake;
use super::protocol::{Request, Response};

/// Transfer server handle. Owned by whoever created it; stopping it is an
/// explicit `shutdown_token().cancel()`, not a process kill.
pub struct Server {
    listener: TcpListener,
    identity: Arc<Identity>,
    store: Arc<FileStore>,
    cancel: CancellationToken,
}

impl Server {
    /// Bind the listener and generate the server's long-lived identity.
    /// The store root is created if it does not exist yet.
    pub async fn bind(addr: &str, store: FileStore) -> Result<Self> {
        store.ensure_root().await?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("transfer server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            identity: Arc::new(Identity::generate()),
            store: Arc::new(store),
            cancel: CancellationToken::new(),
        })
    }

    /// Bind from a loaded [`TransferConfig`]
    pub async fn from_config(config: &TransferConfig) -> Result<Self> {
        Self::bind(
            &config.listen_addr,
            FileStore::new(config.storage_dir.clone()),
        )
        .await
    }

    /// The actual bound address (useful with port 0 in tests)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Public halves of the server's identity
    pub fn public_bundle(&self) -> PublicKeyBundle {
        self.identity.public_bundle()
    }

    /// Token that stops the accept loop when cancelled. In-flight
    /// connection handlers are left to finish on their own.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept loop. Runs until the shutdown token is cancelled; each
    /// accepted connection is handled in its own task.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("transfer server stopping");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            tracing::info!("connection accepted from {}", addr);
                            let identity = self.identity.clone();
                            let store = self.store.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, identity, store).await {
                                    tracing::warn!("connection from {} ended with error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// One connection: handshake, exactly one framed request/response, close
async fn handle_connection(
    mut stream: TcpStream,
    identity: Arc<Identity>,
    store: Arc<FileStore>,
) -> Result<()> {
    let mut engine = CryptoEngine::new(identity);
    server_handshake(&mut stream, &engine.public_bundle()).await?;

    let payload = recv_frame(&mut stream).await?;
    let response = decode_and_handle(&payload, &mut engine, &store).await;
    let bytes = serde_json::to_vec(&response)?;
    send_frame(&mut stream, &bytes).await?;
    Ok(())
}

/// Decode a request payload and dispatch it. Undecodable input becomes a
/// structured `error` response instead of tearing down the server.
async fn decode_and_handle(
    payload: &[u8],
    engine: &mut CryptoEngine,
    store: &FileStore,
) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(v) => v,
        Err(_) => return Response::error("Invalid JSON"),
    };

    match serde_json::from_value::<Request>(value.clone()) {
        Ok(request) => handle_request(request, engine, store).await,
        Err(e) => match value.get("type").and_then(|t| t.as_str()) {
            Some("upload") | Some("download") => {
                Response::error(format!("Malformed request: {}", e))
            }
            Some(_) => Response::error("Unknown request type"),
            None => Response::error("Missing request type"),
        },
    }
}
