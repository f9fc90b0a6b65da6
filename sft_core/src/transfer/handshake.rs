//! One-shot liveness + identity exchange, run once per connection before
//! the single application request.
//!
//! The client sends the literal greeting token; the server answers with the
//! accept token on an exact match or the rejection token before closing.
//! Immediately after accepting, the server pushes its public-key bundle as
//! a single unframed write: a one-time bootstrap, read best-effort on the
//! client side. Failure is terminal for the connection; there is no retry.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::PublicKeyBundle;
use crate::error::{Error, Result};

use super::constants::{ACCEPT, GREETING, HANDSHAKE_READ_SIZE, PUBKEY_READ_SIZE, REJECT};

/// Connection lifecycle on the client side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
}

/// Client side of the handshake. Returns the server's public-key bundle
/// on success; any mismatch or early close is a terminal handshake error.
pub async fn client_handshake<S>(stream: &mut S) -> Result<PublicKeyBundle>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(GREETING).await?;
    stream.flush().await?;

    // The accept token has a fixed length; reading exactly that many bytes
    // keeps the subsequent key bootstrap out of this read even when the
    // server's writes coalesce.
    let mut reply = vec![0u8; ACCEPT.len()];
    stream.read_exact(&mut reply).await.map_err(|e| {
        Error::HandshakeRejected(format!("connection closed during handshake: {}", e))
    })?;

    if reply != ACCEPT {
        // Pull in the rest of the rejection token for the error message
        let mut rest = [0u8; HANDSHAKE_READ_SIZE];
        let n = stream.read(&mut rest).await.unwrap_or(0);
        reply.extend_from_slice(&rest[..n]);
        return Err(Error::HandshakeRejected(
            String::from_utf8_lossy(&reply).into_owned(),
        ));
    }

    // One-shot unframed bootstrap: the server's exported public key bundle
    let mut buf = vec![0u8; PUBKEY_READ_SIZE];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(Error::HandshakeRejected(
            "server closed before sending its public key".to_string(),
        ));
    }
    let text = std::str::from_utf8(&buf[..n])
        .map_err(|_| Error::InvalidKey("public key bundle is not UTF-8".to_string()))?;
    PublicKeyBundle::import(text)
}

/// Server side of the handshake. On an exact greeting match, replies with
/// the accept token followed by this server's public-key bundle; otherwise
/// sends the rejection token and fails so the caller closes the connection.
pub async fn server_handshake<S>(stream: &mut S, bundle: &PublicKeyBundle) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_READ_SIZE];
    let n = stream.read(&mut buf).await?;

    if &buf[..n] != GREETING {
        tracing::warn!("rejecting handshake with unexpected greeting");
        stream.write_all(REJECT).await?;
        stream.flush().await?;
        return Err(Error::HandshakeRejected(format!(
            "unexpected greeting: {:?}",
            String::from_utf8_lossy(&buf[..n])
        )));
    }

    stream.write_all(ACCEPT).await?;
    stream.write_all(bundle.export().as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
