//! IPC listener helpers for the daemon side
//!
//! Creating and cleaning up the Unix Domain Socket listener, plus line-level
//! read/write of protocol messages.

use std::path::PathBuf;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::get_socket_path;
use super::messages::{LinkReply, LinkRequest};

/// Maximum message size
const MAX_MESSAGE_SIZE: usize = 4096;

/// Create and bind the daemon's Unix Domain Socket listener
///
/// Handles cleanup of stale socket files from previous runs.
pub fn create_listener() -> Result<(UnixListener, PathBuf)> {
    let socket_path = get_socket_path();
    create_listener_at(&socket_path)
}

/// Create a listener at a specific path (for testing)
pub fn create_listener_at(socket_path: &PathBuf) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener: creating IPC socket");

    // Ensure parent directory exists
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    // Clean up stale socket if exists
    if socket_path.exists() {
        debug!(?socket_path, "create_listener: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind IPC socket")?;
    debug!(?socket_path, "create_listener: socket bound successfully");

    Ok((listener, socket_path.clone()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &PathBuf) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Read one request from a connection
pub async fn read_request(reader: &mut BufReader<UnixStream>) -> Result<LinkRequest> {
    let mut line = String::new();

    let bytes_read = reader
        .read_line(&mut line)
        .await
        .context("Failed to read IPC message")?;

    if bytes_read > MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("Message too large: {} bytes", bytes_read));
    }

    if line.is_empty() {
        return Err(eyre::eyre!("Empty message received"));
    }

    let msg: LinkRequest = serde_json::from_str(line.trim()).context("Failed to parse IPC message")?;
    debug!(?msg, "read_request: parsed message");

    Ok(msg)
}

/// Send one reply on the connection
pub async fn send_reply(reader: &mut BufReader<UnixStream>, reply: LinkReply) -> Result<()> {
    let reply_json = serde_json::to_string(&reply).context("Failed to serialize reply")?;
    let stream = reader.get_mut();
    stream
        .write_all(reply_json.as_bytes())
        .await
        .context("Failed to write reply")?;
    stream.write_all(b"\n").await.context("Failed to write newline")?;
    stream.flush().await.context("Failed to flush reply")?;
    debug!(?reply, "send_reply: sent reply");
    Ok(())
}
