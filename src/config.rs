//! GroundLink configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;

/// Main GroundLink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vehicle connection transport
    pub connection: ConnectionConfig,

    /// Vehicle behavior preferences
    pub vehicle: VehicleConfig,

    /// Coordinator timing and buffers
    pub coordinator: CoordinatorConfig,

    /// Telemetry session logging
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .groundlink.yml
        let local_config = PathBuf::from(".groundlink.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/groundlink/groundlink.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("groundlink").join("groundlink.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Vehicle connection transport section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Selected transport and its parameters
    pub transport: TransportConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
        }
    }
}

/// Transport kind and transport-specific parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Serial-over-USB
    Usb {
        /// Baud rate
        #[serde(default = "default_baud_rate", rename = "baud-rate")]
        baud_rate: u32,
    },

    /// UDP server socket
    Udp {
        /// Local server port
        #[serde(default = "default_udp_port", rename = "server-port")]
        server_port: u16,

        /// Optional ping target host
        #[serde(default, rename = "ping-host", skip_serializing_if = "Option::is_none")]
        ping_host: Option<String>,

        /// Optional ping target port
        #[serde(default, rename = "ping-port", skip_serializing_if = "Option::is_none")]
        ping_port: Option<u16>,
    },

    /// TCP client
    Tcp {
        /// Server host
        host: String,
        /// Server port
        #[serde(default = "default_tcp_port")]
        port: u16,
    },

    /// Bluetooth SPP
    Bluetooth {
        /// Paired device address, if one has been selected
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
}

fn default_baud_rate() -> u32 {
    57_600
}

fn default_udp_port() -> u16 {
    14_550
}

fn default_tcp_port() -> u16 {
    5760
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Udp {
            server_port: default_udp_port(),
            ping_host: None,
            ping_port: None,
        }
    }
}

/// Vehicle behavior preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Enable the auto-return behavior when a session starts
    #[serde(rename = "auto-return")]
    pub auto_return: bool,
}

/// Telemetry session logging section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directory for session logs; defaults to the platform data directory
    #[serde(rename = "log-dir", skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl TelemetryConfig {
    /// Resolve the session log directory
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("groundlink")
                .join("sessions")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(
            config.connection.transport,
            TransportConfig::Udp {
                server_port: 14_550,
                ping_host: None,
                ping_port: None,
            }
        );
        assert!(!config.vehicle.auto_return);
        assert_eq!(config.coordinator.dispatch_period_ms, 200);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
connection:
  transport:
    type: tcp
    host: 192.168.4.1
    port: 5763

vehicle:
  auto-return: true

coordinator:
  teardown-delay-ms: 2000
  dispatch-period-ms: 100
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            config.connection.transport,
            TransportConfig::Tcp {
                host: "192.168.4.1".to_string(),
                port: 5763,
            }
        );
        assert!(config.vehicle.auto_return);
        assert_eq!(config.coordinator.teardown_delay_ms, 2000);
        assert_eq!(config.coordinator.dispatch_period_ms, 100);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
connection:
  transport:
    type: usb
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified transport with default baud rate
        assert_eq!(config.connection.transport, TransportConfig::Usb { baud_rate: 57_600 });

        // Defaults for unspecified sections
        assert!(!config.vehicle.auto_return);
        assert_eq!(config.coordinator.teardown_delay_ms, 1000);
    }

    #[test]
    fn test_bluetooth_transport_without_address() {
        let yaml = r#"
connection:
  transport:
    type: bluetooth
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.connection.transport, TransportConfig::Bluetooth { address: None });
    }

    #[test]
    fn test_unrecognized_transport_is_rejected() {
        let yaml = r#"
connection:
  transport:
    type: carrier-pigeon
"#;

        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_telemetry_log_dir_override() {
        let config = TelemetryConfig {
            log_dir: Some(PathBuf::from("/tmp/tlogs")),
        };
        assert_eq!(config.resolved_log_dir(), PathBuf::from("/tmp/tlogs"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.vehicle.auto_return = true;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert!(parsed.vehicle.auto_return);
        assert_eq!(parsed.connection.transport, config.connection.transport);
    }
}
