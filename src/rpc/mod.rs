//! Binary RPC frontend.
//!
//! Frames are a 4-byte big-endian length prefix followed by a bincode
//! payload: one [`wire::Envelope`] per request frame, one or more
//! [`wire::Response`] frames per reply. Connections are long-lived and
//! handle requests sequentially in arrival order.

pub mod dispatch;
pub mod wire;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::core::errors::ServiceResult;
use crate::server::state::AppState;

/// Upper bound on a single frame; larger frames are a protocol error.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Read one length-prefixed frame. `Ok(None)` means the peer closed the
/// connection cleanly between frames.
///
/// # Errors
/// Returns an error on I/O failure, a truncated frame, or an oversized
/// length prefix.
pub async fn read_frame<S>(stream: &mut S) -> std::io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one length-prefixed frame.
///
/// # Errors
/// Returns an error on I/O failure or a payload beyond the length prefix.
pub async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large to encode")
    })?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

/// Start the RPC server.
///
/// # Errors
/// Returns an error if the listener cannot be bound.
pub async fn run_rpc_server(state: Arc<AppState>, addr: SocketAddr) -> ServiceResult<()> {
    run_rpc_server_with_shutdown(state, addr, std::future::pending()).await
}

/// Start the RPC server with graceful shutdown support.
///
/// New connections stop being accepted when `shutdown_signal` completes;
/// connections already handling a request finish their current frame.
///
/// # Errors
/// Returns an error if the listener cannot be bound.
pub async fn run_rpc_server_with_shutdown<F>(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown_signal: F,
) -> ServiceResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(state, listener, shutdown_signal).await
}

/// Serve connections from an already-bound listener.
///
/// # Errors
/// Returns an error if the listener address cannot be read.
pub async fn serve_listener<F>(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown_signal: F,
) -> ServiceResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("RPC frontend listening on {}", listener.local_addr()?);
    let mut shutdown = std::pin::pin!(shutdown_signal);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(state, stream).await {
                                tracing::debug!(%peer, error = %err, "rpc connection closed with error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept rpc connection");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_connection(state: Arc<AppState>, mut stream: TcpStream) -> std::io::Result<()> {
    while let Some(bytes) = read_frame(&mut stream).await? {
        let frames = match bincode::deserialize::<wire::Envelope>(&bytes) {
            Ok(envelope) => dispatch::dispatch(&state, envelope).await,
            Err(err) => vec![wire::Response::Error {
                code: wire::error_code::INVALID_ARGUMENT,
                message: format!("undecodable request frame: {err}"),
            }],
        };
        for frame in &frames {
            let encoded = bincode::serialize(frame).map_err(|err| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())
            })?;
            write_frame(&mut stream, &encoded).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let mut sink = std::io::Cursor::new(Vec::new());
        write_frame(&mut sink, b"hello frames").await.unwrap();
        let mut cursor = std::io::Cursor::new(sink.into_inner());
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(frame, b"hello frames");
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let len = u32::try_from(MAX_FRAME_BYTES + 1).unwrap();
        let mut cursor = std::io::Cursor::new(len.to_be_bytes().to_vec());
        assert!(read_frame(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let mut buf = 8u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"oops");
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
