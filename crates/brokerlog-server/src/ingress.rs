//! Event hook listener.
//!
//! The broker engine connects over TCP and writes one JSON event per line.
//! Each connection is served by its own task; events on one connection are
//! dispatched strictly in arrival order.

use std::future::Future;
use std::net::SocketAddr;

use brokerlog_types::decode_line;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::adapter::{Dispatched, EventAdapter};

/// Accepts hook connections until `shutdown` resolves.
///
/// On shutdown the listener is dropped and every open connection task is
/// aborted before this returns. Persistence writes already handed to the
/// blocking pool are not awaited.
///
/// # Errors
///
/// Only I/O errors from the listener itself are returned; per-connection
/// failures are logged and end that connection alone.
pub async fn serve<F>(
    listener: TcpListener,
    adapter: EventAdapter,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "hook connection accepted");
                    connections.spawn(handle_connection(stream, peer, adapter.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept hook connection");
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!(error = %e, "hook connection task panicked");
                    }
                }
            }
        }
    }

    drop(listener);
    connections.shutdown().await;
    tracing::info!("hook listener closed");
    Ok(())
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, adapter: EventAdapter) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%peer, error = %e, "hook connection read failed");
                break;
            }
        }

        // Bad bytes only cost the line they arrived on.
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!(%peer, error = %e, "skipping hook event that is not valid UTF-8");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let event = match decode_line(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "skipping malformed hook event");
                continue;
            }
        };
        tracing::trace!(%peer, event = event.kind(), "hook event received");

        // Text log appends are blocking file I/O.
        let dispatcher = adapter.clone();
        let dispatched = match tokio::task::spawn_blocking(move || dispatcher.dispatch(event)).await
        {
            Ok(dispatched) => dispatched,
            Err(e) => {
                tracing::error!(%peer, error = %e, "hook event dispatch failed");
                continue;
            }
        };

        if let Dispatched::Auth { allow } = dispatched {
            let mut reply = json!({ "allow": allow }).to_string();
            reply.push('\n');
            if let Err(e) = writer.write_all(reply.as_bytes()).await {
                tracing::warn!(%peer, error = %e, "failed to send auth reply");
                break;
            }
        }
    }

    tracing::debug!(%peer, "hook connection closed");
}
