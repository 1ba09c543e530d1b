//! Daemon process management
//!
//! Handles daemonization, PID file management, and process control.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use eyre::{Context, Result};
use tracing::{debug, info, warn};

/// Current daemon version (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default PID file location
fn default_pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("groundlink")
        .join("groundlink.pid")
}

/// Default version file location (alongside PID file)
fn default_version_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("groundlink")
        .join("groundlink.version")
}

/// Daemon process manager
#[derive(Debug)]
pub struct DaemonManager {
    /// Path to the PID file
    pid_file: PathBuf,
    /// Path to the version file
    version_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Create a new daemon manager with the default PID file location
    pub fn new() -> Self {
        Self {
            pid_file: default_pid_path(),
            version_file: default_version_path(),
        }
    }

    /// Create a daemon manager with a custom PID file path
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        let version_file = pid_file.with_extension("version");
        Self { pid_file, version_file }
    }

    /// Check if a daemon is running
    pub fn is_running(&self) -> bool {
        self.read_pid().is_some_and(is_process_running)
    }

    /// Get the running daemon's PID
    pub fn running_pid(&self) -> Option<u32> {
        self.read_pid().filter(|&pid| is_process_running(pid))
    }

    /// Read the PID from the PID file
    fn read_pid(&self) -> Option<u32> {
        if !self.pid_file.exists() {
            return None;
        }

        let mut file = fs::File::open(&self.pid_file).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;

        contents.trim().parse().ok()
    }

    /// Write the PID to the PID file
    fn write_pid(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create PID file directory")?;
        }

        let mut file = fs::File::create(&self.pid_file).context("Failed to create PID file")?;
        write!(file, "{}", pid).context("Failed to write PID")?;

        debug!(pid, path = ?self.pid_file, "Wrote PID file");
        Ok(())
    }

    /// Remove the PID file
    fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file).context("Failed to remove PID file")?;
            debug!(path = ?self.pid_file, "Removed PID file");
        }
        Ok(())
    }

    /// Write the version to the version file
    fn write_version(&self, version: &str) -> Result<()> {
        if let Some(parent) = self.version_file.parent() {
            fs::create_dir_all(parent).context("Failed to create version file directory")?;
        }

        let mut file = fs::File::create(&self.version_file).context("Failed to create version file")?;
        write!(file, "{}", version).context("Failed to write version")?;

        debug!(version, path = ?self.version_file, "Wrote version file");
        Ok(())
    }

    /// Read the version from the version file
    pub fn read_version(&self) -> Option<String> {
        if !self.version_file.exists() {
            return None;
        }

        let mut file = fs::File::open(&self.version_file).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;

        Some(contents.trim().to_string())
    }

    /// Remove the version file
    fn remove_version_file(&self) -> Result<()> {
        if self.version_file.exists() {
            fs::remove_file(&self.version_file).context("Failed to remove version file")?;
            debug!(path = ?self.version_file, "Removed version file");
        }
        Ok(())
    }

    /// Check if the running daemon version matches the current CLI version
    pub fn version_matches(&self) -> bool {
        match self.read_version() {
            Some(daemon_version) => daemon_version == VERSION,
            None => false,
        }
    }

    /// Start the daemon
    ///
    /// Forks a new process and returns immediately.
    pub fn start(&self) -> Result<u32> {
        if let Some(pid) = self.running_pid() {
            return Err(eyre::eyre!("Daemon already running with PID {}", pid));
        }

        info!("Starting daemon...");

        let exe = std::env::current_exe().context("Failed to get current executable")?;

        let child = Command::new(&exe)
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn daemon process")?;

        let pid = child.id();
        self.write_pid(pid)?;

        info!(pid, "Daemon started");
        Ok(pid)
    }

    /// Stop the daemon
    pub fn stop(&self) -> Result<()> {
        let pid = self.running_pid().ok_or_else(|| eyre::eyre!("Daemon is not running"))?;

        info!(pid, "Stopping daemon...");

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context("Failed to send SIGTERM")?;
        }

        // Wait for process to exit (with timeout)
        let mut attempts = 0;
        while is_process_running(pid) && attempts < 50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            attempts += 1;
        }

        if is_process_running(pid) {
            warn!(pid, "Daemon did not stop gracefully, sending SIGKILL");
            #[cfg(unix)]
            {
                use nix::sys::signal::{Signal, kill};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }

        self.remove_pid_file()?;
        self.remove_version_file()?;
        info!(pid, "Daemon stopped");
        Ok(())
    }

    /// Register the current process as the daemon
    ///
    /// Called by the daemon process itself after forking.
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        self.write_pid(pid)?;
        self.write_version(VERSION)?;
        info!(pid, version = VERSION, "Daemon registered");
        Ok(())
    }

    /// Get the PID file path
    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    /// Get the daemon status
    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Check if a process with the given PID is running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        // Signal 0 checks existence without affecting the process
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    /// Whether the daemon is running
    pub running: bool,
    /// Process ID (if running)
    pub pid: Option<u32>,
    /// PID file path
    pub pid_file: PathBuf,
}
