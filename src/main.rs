//! GroundLink - drone ground control station link daemon
//!
//! CLI entry point for managing the daemon and the vehicle connection.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use groundlink::cli::{Cli, Command, OutputFormat, get_log_path};
use groundlink::config::Config;
use groundlink::coordinator::{ConnectionCoordinator, CoordinatorHandle, Hooks};
use groundlink::daemon::{DaemonManager, VERSION};
use groundlink::events::EventBus;
use groundlink::events::TelemetryLogger;
use groundlink::ipc::{LinkClient, LinkReply, LinkRequest, listener};
use groundlink::link::LinkState;
use groundlink::link::sim::{SimTower, SimVehicle};
use groundlink::net::NetworkAvailability;

/// Period of the simulated vehicle's telemetry stream
const SIM_HEARTBEAT: Duration = Duration::from_millis(100);

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("groundlink")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("groundlink.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Start { foreground } => cmd_start(&config, foreground).await,
        Command::Stop => cmd_stop().await,
        Command::Status { format } => cmd_status(format).await,
        Command::Ping => cmd_ping().await,
        Command::Connect => cmd_toggle(true).await,
        Command::Disconnect => cmd_toggle(false).await,
        Command::Watch => cmd_watch().await,
        Command::Network { available } => cmd_network(available).await,
        Command::Logs { follow, lines } => cmd_logs(follow, lines).await,
        Command::RunDaemon => cmd_run_daemon(&config).await,
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    debug!(foreground, "cmd_start: called");
    let daemon = DaemonManager::new();

    if daemon.is_running() {
        if let Some(pid) = daemon.running_pid() {
            println!("GroundLink is already running (PID: {})", pid);
        } else {
            println!("GroundLink is already running");
        }
        return Ok(());
    }

    if foreground {
        println!("Starting GroundLink in foreground mode...");
        run_daemon(config).await
    } else {
        let pid = daemon.start()?;
        println!("GroundLink started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
///
/// Tries IPC shutdown first for graceful stop, falls back to SIGTERM.
async fn cmd_stop() -> Result<()> {
    debug!("cmd_stop: called");
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("GroundLink is not running");
        return Ok(());
    }

    let pid = daemon.running_pid();

    let client = LinkClient::new();
    if client.socket_exists() {
        match client.shutdown().await {
            Ok(()) => {
                debug!("cmd_stop: IPC shutdown acknowledged");
                let mut attempts = 0;
                while daemon.is_running() && attempts < 50 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    attempts += 1;
                }
                if !daemon.is_running() {
                    if let Some(pid) = pid {
                        println!("GroundLink stopped gracefully via IPC (was PID: {})", pid);
                    } else {
                        println!("GroundLink stopped gracefully via IPC");
                    }
                    return Ok(());
                }
                debug!("cmd_stop: IPC shutdown timed out, falling back to SIGTERM");
            }
            Err(e) => {
                debug!(error = %e, "cmd_stop: IPC shutdown failed, falling back to SIGTERM");
            }
        }
    }

    daemon.stop()?;
    if let Some(pid) = pid {
        println!("GroundLink stopped (was PID: {})", pid);
    } else {
        println!("GroundLink stopped");
    }
    Ok(())
}

/// Ping the daemon via IPC to check if it's alive and responsive
async fn cmd_ping() -> Result<()> {
    debug!("cmd_ping: called");

    let daemon = DaemonManager::new();
    if !daemon.is_running() {
        println!("GroundLink is not running");
        return Ok(());
    }

    let client = LinkClient::new();
    if !client.socket_exists() {
        println!("Daemon PID file exists but IPC socket not found");
        println!("The daemon may be starting up or in an inconsistent state");
        return Ok(());
    }

    match client.ping().await {
        Ok(version) => {
            println!("Daemon is alive and responsive");
            println!("Version: {}", version);
        }
        Err(e) => {
            println!("Daemon PID file exists but not responding to IPC");
            println!("Error: {}", e);
        }
    }

    Ok(())
}

/// Show daemon and link status
async fn cmd_status(format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let daemon = DaemonManager::new();
    let daemon_status = daemon.status();

    let client = LinkClient::new();
    let link_status = if daemon_status.running && client.socket_exists() {
        client.status().await.ok()
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": daemon_status.running,
                "pid": daemon_status.pid,
                "pid_file": daemon_status.pid_file.to_string_lossy(),
                "link": link_status,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("GroundLink Status");
            println!("-----------------");
            if daemon_status.running {
                match daemon_status.pid {
                    Some(pid) => println!("Daemon: {} (PID: {})", "running".green(), pid),
                    None => println!("Daemon: {}", "running".green()),
                }
            } else {
                println!("Daemon: {}", "stopped".red());
            }

            if let Some(status) = link_status {
                let tower = if status.tower_connected {
                    "connected".green()
                } else {
                    "disconnected".red()
                };
                println!("Tower: {}", tower);

                let vehicle = match status.vehicle {
                    LinkState::Connected => "connected".green(),
                    LinkState::Connecting => "connecting".yellow(),
                    LinkState::Disconnected => "disconnected".red(),
                };
                match status.active_params {
                    Some(params) => println!("Vehicle: {} ({})", vehicle, params),
                    None => println!("Vehicle: {}", vehicle),
                }

                println!("Observers: {}", status.observers);
                println!(
                    "Network: {}",
                    if status.network_available { "available" } else { "unavailable" }
                );
            }

            println!("PID file: {}", daemon_status.pid_file.display());
        }
    }

    Ok(())
}

/// Request the daemon to establish or drop the vehicle connection
async fn cmd_toggle(establish: bool) -> Result<()> {
    debug!(establish, "cmd_toggle: called");
    let client = LinkClient::new();

    if !client.socket_exists() {
        println!("GroundLink daemon is not running (try `gl start`)");
        return Ok(());
    }

    let result = if establish {
        client.connect_vehicle().await
    } else {
        client.disconnect_vehicle().await
    };

    match result {
        Ok(()) => println!("Vehicle {} requested", if establish { "connect" } else { "disconnect" }),
        Err(e) => println!("Request failed: {}", e),
    }

    Ok(())
}

/// Subscribe to telemetry events and print them
async fn cmd_watch() -> Result<()> {
    debug!("cmd_watch: called");
    let client = LinkClient::new();

    if !client.socket_exists() {
        println!("GroundLink daemon is not running (try `gl start`)");
        return Ok(());
    }

    let mut stream = client.subscribe().await?;
    println!("Watching telemetry events (Ctrl+C to stop)");
    println!();

    loop {
        tokio::select! {
            event = stream.next() => match event? {
                Some(event) => {
                    let name = if event.is_structural() {
                        event.name.cyan().bold().to_string()
                    } else {
                        event.name.clone()
                    };
                    match &event.payload {
                        Some(payload) => println!("{} {}", name, payload),
                        None => println!("{}", name),
                    }
                }
                None => {
                    println!("Daemon closed the stream");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Update the daemon's network availability indicator
async fn cmd_network(available: bool) -> Result<()> {
    debug!(available, "cmd_network: called");
    let client = LinkClient::new();

    if !client.socket_exists() {
        println!("GroundLink daemon is not running (try `gl start`)");
        return Ok(());
    }

    client.set_network_available(available).await?;
    println!("Network marked {}", if available { "available" } else { "unavailable" });
    Ok(())
}

/// Show logs
async fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    debug!(follow, lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = all_lines.len().saturating_sub(lines);
        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Run as the daemon process (internal command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    debug!("cmd_run_daemon: called");
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    run_daemon(config).await
}

/// Run the daemon main loop
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Daemon starting...");

    let network = NetworkAvailability::new();
    let bus = Arc::new(EventBus::with_default_capacity());

    // Telemetry session logger follows the bus
    let telemetry_dir = config.telemetry.resolved_log_dir();
    let logger_task = tokio::spawn(TelemetryLogger::new(&telemetry_dir).run(bus.clone()));
    info!(path = %telemetry_dir.display(), "Telemetry session logger started");

    // The daemon drives the simulated link; hardware transports attach
    // through the TowerLink/VehicleLink traits instead
    let coordinator = ConnectionCoordinator::new(
        config,
        Box::new(SimTower::new()),
        Box::new(SimVehicle::new().with_heartbeat(SIM_HEARTBEAT)),
        bus.clone(),
        Hooks::default(),
        network.clone(),
    );
    let handle = coordinator.handle();
    let coord_task = tokio::spawn(coordinator.run());
    info!("Connection coordinator started");

    let (ipc_listener, socket_path) = listener::create_listener()?;
    info!(?socket_path, "IPC socket listening");

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    info!("Daemon running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            accepted = ipc_listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        handle.clone(),
                        bus.clone(),
                        network.clone(),
                        shutdown_tx.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "IPC accept failed"),
            },
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested via IPC");
                break;
            }
            _ = sigint.recv() => {
                warn!("SIGINT received");
                break;
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received");
                break;
            }
        }
    }

    info!("Daemon shutting down...");

    let _ = handle.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), coord_task).await;

    listener::cleanup_socket(&socket_path);
    logger_task.abort();

    info!("Daemon stopped");
    Ok(())
}

/// Handle one IPC connection
async fn handle_connection(
    stream: tokio::net::UnixStream,
    handle: CoordinatorHandle,
    bus: Arc<EventBus>,
    network: NetworkAvailability,
    shutdown_tx: mpsc::Sender<()>,
) {
    let mut reader = tokio::io::BufReader::new(stream);

    let request = match listener::read_request(&mut reader).await {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "IPC connection dropped before a request arrived");
            return;
        }
    };

    match request {
        LinkRequest::Subscribe => {
            debug!("IPC subscriber attached");
            let mut events = bus.subscribe();
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if listener::send_reply(&mut reader, LinkReply::Event { event })
                            .await
                            .is_err()
                        {
                            debug!("IPC subscriber hung up");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "IPC subscriber lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }

        LinkRequest::Toggle { establish } => {
            let establish = match establish {
                Some(establish) => establish,
                // Absent flag means flip the current vehicle state
                None => match handle.status().await {
                    Ok(status) => status.vehicle != LinkState::Connected,
                    Err(e) => {
                        let _ = listener::send_reply(&mut reader, error_reply(e)).await;
                        return;
                    }
                },
            };

            let result = if establish {
                handle.connect().await
            } else {
                handle.disconnect().await
            };
            let reply = match result {
                Ok(()) => LinkReply::Ok,
                Err(e) => error_reply(e),
            };
            let _ = listener::send_reply(&mut reader, reply).await;
        }

        LinkRequest::Status => {
            let reply = match handle.status().await {
                Ok(status) => LinkReply::Status { status },
                Err(e) => error_reply(e),
            };
            let _ = listener::send_reply(&mut reader, reply).await;
        }

        LinkRequest::Ping => {
            let reply = LinkReply::Pong {
                version: VERSION.to_string(),
            };
            let _ = listener::send_reply(&mut reader, reply).await;
        }

        LinkRequest::NetworkAvailable { available } => {
            network.set_available(available);
            let _ = listener::send_reply(&mut reader, LinkReply::Ok).await;
        }

        LinkRequest::Shutdown => {
            let _ = shutdown_tx.send(()).await;
            let _ = listener::send_reply(&mut reader, LinkReply::Ok).await;
        }
    }
}

fn error_reply(e: eyre::Report) -> LinkReply {
    LinkReply::Error {
        message: e.to_string(),
    }
}
