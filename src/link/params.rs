//! Connection parameter construction
//!
//! Parameters are built from the configured transport section right before a
//! connect attempt. Construction can fail (unrecognized transport sections
//! are rejected at deserialization time; a Bluetooth transport without a
//! device address fails here) and the coordinator aborts the attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConnectionConfig, TransportConfig};

/// Errors building connection parameters from configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    /// Bluetooth selected but no device address configured
    #[error("no bluetooth device address configured")]
    MissingBluetoothAddress,
}

/// Optional UDP ping target used to keep NAT mappings alive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingTarget {
    /// Receiver host
    pub host: String,
    /// Receiver port
    pub port: u16,
}

/// Parameters for one vehicle connection attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ConnectionParams {
    /// Serial-over-USB link
    Usb {
        /// Baud rate
        baud_rate: u32,
    },
    /// UDP server socket, optionally pinging a fixed target
    Udp {
        /// Local server port
        server_port: u16,
        /// Ping target, when configured
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ping: Option<PingTarget>,
    },
    /// TCP client link
    Tcp {
        /// Server host
        host: String,
        /// Server port
        port: u16,
    },
    /// Bluetooth SPP link
    Bluetooth {
        /// Device address
        address: String,
    },
}

impl std::fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usb { baud_rate } => write!(f, "usb@{}", baud_rate),
            Self::Udp { server_port, ping } => match ping {
                Some(target) => write!(f, "udp:{} ping {}:{}", server_port, target.host, target.port),
                None => write!(f, "udp:{}", server_port),
            },
            Self::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
            Self::Bluetooth { address } => write!(f, "bt:{}", address),
        }
    }
}

/// Build connection parameters from the configured transport
pub fn params_from_config(config: &ConnectionConfig) -> Result<ConnectionParams, ParamError> {
    match &config.transport {
        TransportConfig::Usb { baud_rate } => Ok(ConnectionParams::Usb { baud_rate: *baud_rate }),

        TransportConfig::Udp {
            server_port,
            ping_host,
            ping_port,
        } => {
            let ping = match (ping_host, ping_port) {
                (Some(host), Some(port)) => Some(PingTarget {
                    host: host.clone(),
                    port: *port,
                }),
                _ => None,
            };
            Ok(ConnectionParams::Udp {
                server_port: *server_port,
                ping,
            })
        }

        TransportConfig::Tcp { host, port } => Ok(ConnectionParams::Tcp {
            host: host.clone(),
            port: *port,
        }),

        TransportConfig::Bluetooth { address } => match address {
            Some(address) if !address.is_empty() => Ok(ConnectionParams::Bluetooth {
                address: address.clone(),
            }),
            _ => Err(ParamError::MissingBluetoothAddress),
        },
    }
}
