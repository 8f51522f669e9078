//! Real-time scheduling privileges: SCHED_FIFO elevation and memory locking.
//!
//! Both requests degrade gracefully. Without `CAP_SYS_NICE` / `CAP_IPC_LOCK`
//! (or a suitable `RLIMIT_RTPRIO` / `RLIMIT_MEMLOCK`) the calls fail and the
//! session keeps running on default scheduling.
//!
//! # Safety
//!
//! `pthread_setschedparam` has no safe wrapper in `nix`, so this module allows
//! `unsafe` for that single call on the calling thread's own handle.

#![allow(unsafe_code)]

use std::fmt;

use tracing::{info, warn};

use super::error::GatewayError;

/// Outcome of a privilege request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elevation {
    /// The privilege was granted.
    Elevated,
    /// Refused for lack of privilege; execution continues without it.
    Degraded {
        /// Why the request was refused.
        reason: String,
    },
    /// The request failed for another reason (bad argument, unsupported
    /// platform); execution continues without it.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl Elevation {
    /// Whether the privilege is in effect.
    #[must_use]
    pub const fn is_elevated(&self) -> bool {
        matches!(self, Self::Elevated)
    }

    /// The soft error describing why elevation is not in effect, if it isn't.
    #[must_use]
    pub fn as_error(&self) -> Option<GatewayError> {
        match self {
            Self::Elevated => None,
            Self::Degraded { reason } | Self::Failed { reason } => {
                Some(GatewayError::PrivilegeElevationUnavailable(reason.clone()))
            }
        }
    }

    /// Short label for the scheduling mode in effect.
    #[must_use]
    pub const fn scheduling_label(&self) -> &'static str {
        match self {
            Self::Elevated => "SCHED_FIFO",
            Self::Degraded { .. } | Self::Failed { .. } => "default scheduling",
        }
    }
}

impl fmt::Display for Elevation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elevated => f.write_str("elevated"),
            Self::Degraded { reason } => write!(f, "degraded: {reason}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Requests elevated scheduling for the calling thread.
///
/// A seam so runners can be exercised without touching the host scheduler.
pub trait PriorityElevator: Send + Sync + Clone + 'static {
    /// Ask for fixed-priority, non-time-sliced scheduling at `priority`.
    fn elevate(&self, priority: i32) -> Elevation;
}

/// Applies `SCHED_FIFO` to the current thread through `pthread_setschedparam`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoElevator;

impl PriorityElevator for FifoElevator {
    fn elevate(&self, priority: i32) -> Elevation {
        let outcome = set_current_thread_fifo(priority);
        match &outcome {
            Elevation::Elevated => info!(priority, "SCHED_FIFO scheduling enabled"),
            Elevation::Degraded { reason } => warn!(
                priority,
                reason = %reason,
                "Real-time priority unavailable, continuing on default scheduling"
            ),
            Elevation::Failed { reason } => warn!(
                priority,
                reason = %reason,
                "Real-time priority request failed, continuing on default scheduling"
            ),
        }
        outcome
    }
}

/// Elevator that always reports the same outcome without touching the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedElevator(pub Elevation);

impl PriorityElevator for FixedElevator {
    fn elevate(&self, _priority: i32) -> Elevation {
        self.0.clone()
    }
}

#[cfg(unix)]
fn set_current_thread_fifo(priority: i32) -> Elevation {
    use nix::errno::Errno;
    use nix::libc;

    // SAFETY: `sched_param` is a plain C struct for which all-zero bytes are valid.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;

    // SAFETY: `pthread_self()` is always a valid handle for the calling thread
    // and `param` outlives the call.
    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };

    match ret {
        0 => Elevation::Elevated,
        libc::EPERM => Elevation::Degraded {
            reason: format!("insufficient privilege ({})", Errno::from_raw(ret)),
        },
        other => Elevation::Failed {
            reason: Errno::from_raw(other).to_string(),
        },
    }
}

#[cfg(not(unix))]
fn set_current_thread_fifo(_priority: i32) -> Elevation {
    Elevation::Failed {
        reason: "SCHED_FIFO is not supported on this platform".into(),
    }
}

/// Lock current and future pages of the process into RAM.
///
/// Page faults on swapped-out memory would add unbounded latency to cycles.
#[must_use]
pub fn lock_process_memory() -> Elevation {
    let outcome = mlock_all();
    match &outcome {
        Elevation::Elevated => info!("Process memory locked"),
        other => warn!(outcome = %other, "Memory locking unavailable, continuing"),
    }
    outcome
}

/// Undo [`lock_process_memory`]. Errors are logged and ignored.
pub fn unlock_process_memory() {
    #[cfg(unix)]
    {
        if let Err(e) = nix::sys::mman::munlockall() {
            warn!(error = %e, "munlockall failed");
        }
    }
}

#[cfg(unix)]
fn mlock_all() -> Elevation {
    use nix::errno::Errno;
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => Elevation::Elevated,
        Err(errno @ (Errno::EPERM | Errno::ENOMEM)) => Elevation::Degraded {
            reason: errno.to_string(),
        },
        Err(errno) => Elevation::Failed {
            reason: errno.to_string(),
        },
    }
}

#[cfg(not(unix))]
fn mlock_all() -> Elevation {
    Elevation::Failed {
        reason: "mlockall is not supported on this platform".into(),
    }
}
