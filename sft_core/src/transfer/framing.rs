use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

use super::constants::{LEN_PREFIX_SIZE, MAX_FRAME_SIZE};

/// Send one framed message: an 8-digit zero-padded decimal ASCII length
/// prefix followed by exactly that many payload bytes.
pub async fn send_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(payload.len()));
    }

    let prefix = format!("{:0width$}", payload.len(), width = LEN_PREFIX_SIZE);
    stream.write_all(prefix.as_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Receive one framed message.
///
/// Blocks until the 8 prefix bytes are in, parses them as an unsigned
/// decimal, then accumulates exactly that many payload bytes. Partial reads
/// are looped over by `read_exact`; a stream that closes before the full
/// length arrives surfaces as a transport error.
pub async fn recv_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
    let mut prefix = [0u8; LEN_PREFIX_SIZE];
    stream.read_exact(&mut prefix).await?;

    let text = std::str::from_utf8(&prefix)
        .map_err(|_| Error::Protocol("length prefix is not ASCII".to_string()))?;
    let len: usize = text
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid length prefix: {:?}", text)))?;

    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}
