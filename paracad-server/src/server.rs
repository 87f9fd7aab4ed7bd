//! Unix-socket IPC server.
//!
//! Wire format: 4-byte little-endian length prefix + MessagePack payload,
//! one `ParacadRequest` per frame, one `ParacadResponse` back. Connections
//! are handled concurrently; requests within a connection run in order.

use crate::router;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use paracad_core::{
    ipc::{ParacadRequest, ParacadResponse},
    ParacadConfig,
};
use sqlx::PgPool;
use std::path::Path;
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

fn le_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

pub async fn run_unix_server(
    socket_path: &str,
    pool: PgPool,
    config: ParacadConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let pool = pool.clone();
                let config = config.clone();
                tokio::spawn(handle_connection(stream, pool, config));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

async fn handle_connection(stream: UnixStream, pool: PgPool, config: ParacadConfig) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<ParacadRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &pool, &config).await,
            Err(e) => ParacadResponse::err(format!("Deserialization error: {}", e)),
        };

        if !send_response(&mut framed_write, &response).await {
            break;
        }
    }
}

/// Serialize and send one response frame. Returns false when the connection
/// should be dropped.
async fn send_response(
    framed_write: &mut FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    response: &ParacadResponse,
) -> bool {
    let resp_bytes = match rmp_serde::to_vec_named(response) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            return false;
        }
    };

    if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
        tracing::error!("Failed to send response: {}", e);
        return false;
    }

    true
}
