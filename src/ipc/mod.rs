//! Inter-process communication with the link daemon
//!
//! Unix Domain Socket IPC between the `gl` CLI and the daemon: toggle the
//! vehicle connection, query status, stream telemetry events, feed the
//! network availability indicator, and request shutdown.

use std::path::PathBuf;

pub mod client;
pub mod listener;
pub mod messages;

pub use client::{EventStream, LinkClient};
pub use messages::{LinkReply, LinkRequest};

/// Get the socket path for daemon IPC
///
/// Uses the same base directory as the other daemon files (PID file, version
/// file).
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("groundlink")
        .join("link.sock")
}
