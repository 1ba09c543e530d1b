//! Collaborator hooks
//!
//! The coordinator reaches the UI-facing world through three narrow
//! callbacks, one per concern, instead of a listener interface: surfacing a
//! link failure to the user, launching device selection when Bluetooth has no
//! configured address, and starting the dependent service once a vehicle
//! session is up. Defaults log and do nothing else.

use tracing::{info, warn};

/// Function-typed callbacks into the hosting application
pub struct Hooks {
    /// Surface a user-visible link failure message
    pub on_link_failure: Box<dyn Fn(&str) + Send>,

    /// Launch the device-selection flow
    pub on_missing_device: Box<dyn Fn() + Send>,

    /// Start the dependent service for a new vehicle session
    pub on_session_start: Box<dyn Fn() + Send>,
}

impl Hooks {
    /// Replace the link-failure sink
    pub fn with_link_failure(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.on_link_failure = Box::new(f);
        self
    }

    /// Replace the device-selection launcher
    pub fn with_missing_device(mut self, f: impl Fn() + Send + 'static) -> Self {
        self.on_missing_device = Box::new(f);
        self
    }

    /// Replace the session-start launcher
    pub fn with_session_start(mut self, f: impl Fn() + Send + 'static) -> Self {
        self.on_session_start = Box::new(f);
        self
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            on_link_failure: Box::new(|message| warn!(%message, "Connection failed")),
            on_missing_device: Box::new(|| warn!("Bluetooth selected but no device address configured")),
            on_session_start: Box::new(|| info!("Vehicle session started")),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}
