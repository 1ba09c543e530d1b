//! IPC client for communicating with the link daemon
//!
//! Used by the CLI to toggle the vehicle connection, query status, stream
//! telemetry events, and stop the daemon via Unix Domain Socket.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::coordinator::LinkStatus;
use crate::events::TelemetryEvent;

use super::get_socket_path;
use super::messages::{LinkReply, LinkRequest};

/// Default timeout for request/reply operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum message size
const MAX_MESSAGE_SIZE: usize = 4096;

/// Client for communicating with the link daemon via IPC
#[derive(Debug, Clone)]
pub struct LinkClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for LinkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkClient {
    /// Create a new client with the default socket path
    pub fn new() -> Self {
        Self {
            socket_path: get_socket_path(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a client with a custom socket path (for testing)
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the daemon socket exists
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Request the daemon to establish the vehicle connection
    pub async fn connect_vehicle(&self) -> Result<()> {
        debug!("LinkClient: requesting vehicle connect");
        self.expect_ok(LinkRequest::Toggle { establish: Some(true) }).await
    }

    /// Request the daemon to drop the vehicle connection
    pub async fn disconnect_vehicle(&self) -> Result<()> {
        debug!("LinkClient: requesting vehicle disconnect");
        self.expect_ok(LinkRequest::Toggle { establish: Some(false) }).await
    }

    /// Flip the vehicle connection state
    pub async fn toggle_vehicle(&self) -> Result<()> {
        debug!("LinkClient: toggling vehicle connection");
        self.expect_ok(LinkRequest::Toggle { establish: None }).await
    }

    /// Fetch the coordinator status
    pub async fn status(&self) -> Result<LinkStatus> {
        debug!("LinkClient: requesting status");
        match self.send_request(LinkRequest::Status).await? {
            LinkReply::Status { status } => Ok(status),
            LinkReply::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            _ => Err(eyre::eyre!("Unexpected reply")),
        }
    }

    /// Check if the daemon is alive and get its version
    pub async fn ping(&self) -> Result<String> {
        debug!("LinkClient: pinging daemon");
        match self.send_request(LinkRequest::Ping).await? {
            LinkReply::Pong { version } => Ok(version),
            LinkReply::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            _ => Err(eyre::eyre!("Unexpected reply")),
        }
    }

    /// Update the daemon's network availability indicator
    pub async fn set_network_available(&self, available: bool) -> Result<()> {
        debug!(available, "LinkClient: updating network availability");
        self.expect_ok(LinkRequest::NetworkAvailable { available }).await
    }

    /// Request the daemon to shutdown gracefully
    pub async fn shutdown(&self) -> Result<()> {
        debug!("LinkClient: requesting daemon shutdown");
        self.expect_ok(LinkRequest::Shutdown).await
    }

    /// Subscribe to forwarded telemetry events
    ///
    /// The returned stream yields events until the daemon goes away or the
    /// stream is dropped.
    pub async fn subscribe(&self) -> Result<EventStream> {
        debug!("LinkClient: subscribing to telemetry events");
        let mut stream = self.open_stream().await?;
        write_request(&mut stream, &LinkRequest::Subscribe, self.timeout).await?;
        Ok(EventStream {
            reader: BufReader::new(stream),
        })
    }

    async fn expect_ok(&self, msg: LinkRequest) -> Result<()> {
        match self.send_request(msg).await? {
            LinkReply::Ok => Ok(()),
            LinkReply::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            _ => Err(eyre::eyre!("Unexpected reply")),
        }
    }

    /// Send one request and wait for one reply
    async fn send_request(&self, msg: LinkRequest) -> Result<LinkReply> {
        debug!(?self.socket_path, ?msg, "LinkClient: sending request");
        let mut stream = self.open_stream().await?;
        write_request(&mut stream, &msg, self.timeout).await?;

        // Read reply with size limit
        let mut reader = BufReader::new(&mut stream);
        let mut reply_line = String::new();

        tokio::time::timeout(self.timeout, async {
            let bytes_read = reader
                .read_line(&mut reply_line)
                .await
                .context("Failed to read reply")?;

            if bytes_read > MAX_MESSAGE_SIZE {
                return Err(eyre::eyre!("Reply too large: {} bytes", bytes_read));
            }

            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Read timeout")??;

        let reply: LinkReply = serde_json::from_str(reply_line.trim()).context("Failed to parse daemon reply")?;

        debug!(?reply, "LinkClient: received reply");
        Ok(reply)
    }

    async fn open_stream(&self) -> Result<UnixStream> {
        tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to daemon socket")
    }
}

async fn write_request(stream: &mut UnixStream, msg: &LinkRequest, timeout: Duration) -> Result<()> {
    let msg_json = serde_json::to_string(msg).context("Failed to serialize request")?;

    if msg_json.len() > MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("Request too large: {} bytes", msg_json.len()));
    }

    tokio::time::timeout(timeout, async {
        stream
            .write_all(msg_json.as_bytes())
            .await
            .context("Failed to write request")?;
        stream.write_all(b"\n").await.context("Failed to write newline")?;
        stream.flush().await.context("Failed to flush stream")?;
        Ok::<_, eyre::Error>(())
    })
    .await
    .context("Write timeout")?
}

/// Stream of telemetry events from a subscription
pub struct EventStream {
    reader: BufReader<UnixStream>,
}

impl EventStream {
    /// Receive the next event, or `None` when the daemon closes the stream
    pub async fn next(&mut self) -> Result<Option<TelemetryEvent>> {
        let mut line = String::new();
        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .context("Failed to read event stream")?;

        if bytes_read == 0 {
            return Ok(None);
        }

        match serde_json::from_str::<LinkReply>(line.trim()).context("Failed to parse event")? {
            LinkReply::Event { event } => Ok(Some(event)),
            LinkReply::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            _ => Err(eyre::eyre!("Unexpected reply on event stream")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_default() {
        let client = LinkClient::default();
        assert!(client.socket_path.ends_with("link.sock"));
    }

    #[test]
    fn test_client_with_custom_path() {
        let path = PathBuf::from("/custom/path/link.sock");
        let client = LinkClient::with_socket_path(path.clone());
        assert_eq!(client.socket_path, path);
    }

    #[test]
    fn test_client_with_timeout() {
        let client = LinkClient::new().with_timeout(Duration::from_secs(10));
        assert_eq!(client.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_socket_exists_false() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.sock");
        let client = LinkClient::with_socket_path(path);
        assert!(!client.socket_exists());
    }

    #[tokio::test]
    async fn test_subscribe_stream_yields_events() {
        use crate::ipc::listener::{create_listener_at, read_request, send_reply};
        use tokio::io::BufReader as TokioBufReader;

        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("test.sock");
        let (listener, _) = create_listener_at(&socket_path).unwrap();

        // A mock daemon that streams two events and hangs up
        let mock_daemon = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = TokioBufReader::new(stream);

            let msg = read_request(&mut reader).await.unwrap();
            assert_eq!(msg, LinkRequest::Subscribe);

            for name in ["connected", "battery"] {
                send_reply(
                    &mut reader,
                    LinkReply::Event {
                        event: TelemetryEvent::new(name, None),
                    },
                )
                .await
                .unwrap();
            }
        });

        let client = LinkClient::with_socket_path(socket_path);
        let mut stream = client.subscribe().await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().name, "connected");
        assert_eq!(stream.next().await.unwrap().unwrap().name, "battery");
        assert!(stream.next().await.unwrap().is_none());

        mock_daemon.await.unwrap();
    }
}
