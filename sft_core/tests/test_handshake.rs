use std::net::SocketAddr;
use std::path::Path;

use sft_core::transfer::constants::{ACCEPT, GREETING, REJECT};
use sft_core::{Client, Error, FileStore, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

async fn spawn_server(root: &Path) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let server = Server::bind("127.0.0.1:0", FileStore::new(root)).await?;
    let addr = server.local_addr()?;
    let token = server.shutdown_token();
    tokio::spawn(server.run());
    Ok((addr, token))
}

#[tokio::test]
async fn test_garbled_greeting_gets_rejection_token() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"HELLO?").await?;

    let mut reply = vec![0u8; 64];
    let n = stream.read(&mut reply).await?;
    assert_eq!(&reply[..n], REJECT);

    // Server closes the connection after rejecting
    let closed = stream.read(&mut reply).await?;
    assert_eq!(closed, 0);
    Ok(())
}

#[tokio::test]
async fn test_correct_greeting_gets_accept_and_public_key() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(GREETING).await?;

    let mut accept = vec![0u8; ACCEPT.len()];
    stream.read_exact(&mut accept).await?;
    assert_eq!(accept, ACCEPT);

    // The unframed bootstrap carries a parseable public key bundle
    let mut buf = vec![0u8; 2048];
    let n = stream.read(&mut buf).await?;
    assert!(n > 0);
    let bundle = sft_core::PublicKeyBundle::import(std::str::from_utf8(&buf[..n])?)?;
    assert_eq!(bundle.signing.len(), 32);
    Ok(())
}

#[tokio::test]
async fn test_connect_fails_against_rejecting_peer() -> anyhow::Result<()> {
    // A peer that answers the greeting with something other than the
    // accept token makes connect() fail terminally
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"Go away").await;
        }
    });

    let mut client = Client::new(addr.to_string());
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::HandshakeRejected(_)), "got {:?}", err);
    assert!(!client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_server_survives_rejected_handshakes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    for _ in 0..3 {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(b"not the greeting").await?;
        let mut reply = vec![0u8; 64];
        let _ = stream.read(&mut reply).await?;
    }

    // A well-behaved client still gets through
    let mut client = Client::new(addr.to_string());
    client.connect().await?;
    client.upload(b"still alive", "alive.txt", false).await?;
    Ok(())
}
