//! Shared network availability flag
//!
//! The one piece of state touched from outside the coordinator's serialized
//! queue (connectivity callbacks arrive on arbitrary threads), so it is a
//! cloneable handle over an atomic rather than a field of the actor. Injected
//! into whoever needs it instead of living in a global.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable handle to the process-wide network availability indicator
#[derive(Clone, Debug, Default)]
pub struct NetworkAvailability {
    available: Arc<AtomicBool>,
}

impl NetworkAvailability {
    /// Create a flag that starts unavailable
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether the network is currently available
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Whether the network is currently available
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}
