//! Process-wide cooperative shutdown flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "still running" flag.
///
/// The lifecycle owner calls [`ShutdownSignal::trigger`]; sessions only read
/// it between cycles. Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    running: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a signal in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether shutdown has not been requested yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request shutdown. Returns `true` on the first call only.
    pub fn trigger(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
