//! The server must convert malformed or unservable requests into
//! structured responses and keep accepting connections afterwards.

use std::net::SocketAddr;
use std::path::Path;

use sft_core::transfer::constants::{ACCEPT, GREETING};
use sft_core::transfer::framing::{recv_frame, send_frame};
use sft_core::{Client, Error, FileStore, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

async fn spawn_server(root: &Path) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let server = Server::bind("127.0.0.1:0", FileStore::new(root)).await?;
    let addr = server.local_addr()?;
    let token = server.shutdown_token();
    tokio::spawn(server.run());
    Ok((addr, token))
}

/// Raw handshake: greeting, accept token, drain the public-key bootstrap
async fn raw_handshake(addr: SocketAddr) -> anyhow::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(GREETING).await?;

    let mut accept = vec![0u8; ACCEPT.len()];
    stream.read_exact(&mut accept).await?;
    assert_eq!(accept, ACCEPT);

    let mut key_buf = vec![0u8; 2048];
    let n = stream.read(&mut key_buf).await?;
    assert!(n > 0);
    Ok(stream)
}

#[tokio::test]
async fn test_invalid_json_gets_error_response() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    let mut stream = raw_handshake(addr).await?;
    send_frame(&mut stream, b"this is not json at all").await?;

    let reply = recv_frame(&mut stream).await?;
    let response: serde_json::Value = serde_json::from_slice(&reply)?;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "Invalid JSON");
    Ok(())
}

#[tokio::test]
async fn test_unknown_request_type_gets_error_response() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    let mut stream = raw_handshake(addr).await?;
    send_frame(&mut stream, br#"{"type":"delete","filename":"song.mp3"}"#).await?;

    let reply = recv_frame(&mut stream).await?;
    let response: serde_json::Value = serde_json::from_slice(&reply)?;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "Unknown request type");
    Ok(())
}

#[tokio::test]
async fn test_server_keeps_accepting_after_bad_requests() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    let bad_payloads: [&[u8]; 3] = [b"garbage", br#"{"type":"shrug"}"#, br#"{"no_type":1}"#];
    for payload in bad_payloads {
        let mut stream = raw_handshake(addr).await?;
        send_frame(&mut stream, payload).await?;
        let reply = recv_frame(&mut stream).await?;
        let response: serde_json::Value = serde_json::from_slice(&reply)?;
        assert_eq!(response["status"], "error");
    }

    let mut client = Client::new(addr.to_string());
    client.connect().await?;
    client.upload(b"recovered", "fine.txt", false).await?;
    Ok(())
}

#[tokio::test]
async fn test_download_of_missing_file_is_not_found() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    let mut client = Client::new(addr.to_string());
    client.connect().await?;
    let err = client.download("missing.mp3").await.unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_malformed_upload_fields_get_error_response() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (addr, _token) = spawn_server(dir.path()).await?;

    // Well-typed tag but the upload body is missing its fields
    let mut stream = raw_handshake(addr).await?;
    send_frame(&mut stream, br#"{"type":"upload","metadata":{}}"#).await?;

    let reply = recv_frame(&mut stream).await?;
    let response: serde_json::Value = serde_json::from_slice(&reply)?;
    assert_eq!(response["status"], "error");
    assert!(
        response["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("Malformed request"),
        "got {}",
        response["message"]
    );
    Ok(())
}
