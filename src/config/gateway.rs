//! Gateway configuration: allow-list, identity, and real-time task parameters.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listening address for the gateway server.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Identity accepted by the credential exchange unless configured otherwise.
pub const DEFAULT_AUTHORIZED_IDENTITY: &str = "admin";
/// Longest identity line (excluding the line ending) the gateway will read.
pub const DEFAULT_MAX_IDENTITY_LEN: usize = 50;
/// SCHED_FIFO priority requested for session threads.
pub const DEFAULT_RT_PRIORITY: i32 = 50;
/// Length of one scheduling period.
pub const DEFAULT_PERIOD_MS: u64 = 1000;
/// Number of cycles a session runs before completing.
pub const DEFAULT_CYCLE_BOUND: u32 = 20;
/// Busy-loop iterations of the demonstration workload run after each cycle.
pub const DEFAULT_WORKLOAD_ITERATIONS: u32 = 100_000;

const MIN_RT_PRIORITY: i32 = 1;
const MAX_RT_PRIORITY: i32 = 99;
const MIN_THREAD_STACK_SIZE: usize = 64 * 1024;

/// Immutable configuration shared by the authorization pipeline and the
/// session runner.
///
/// Built once at startup, validated, then wrapped in an `Arc` and passed
/// explicitly to every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the server listens on.
    pub bind_addr: SocketAddr,
    /// Origins allowed to reach the credential exchange. Exact match only.
    pub allowed_origins: Vec<IpAddr>,
    /// The single identity the credential exchange accepts.
    pub authorized_identity: String,
    /// Maximum identity length in bytes, excluding the line ending.
    pub max_identity_len: usize,
    /// Fixed real-time priority requested for session threads (1..=99).
    pub rt_priority: i32,
    /// Scheduling period in milliseconds.
    pub period_ms: u64,
    /// Number of cycles each session runs.
    pub cycle_bound: u32,
    /// Iterations of the per-cycle demonstration workload.
    pub workload_iterations: u32,
    /// Stack size for per-session threads, in bytes.
    pub thread_stack_size: usize,
    /// How long the server waits for live sessions after shutdown is signalled.
    pub shutdown_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            allowed_origins: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)),
            ],
            authorized_identity: DEFAULT_AUTHORIZED_IDENTITY.to_string(),
            max_identity_len: DEFAULT_MAX_IDENTITY_LEN,
            rt_priority: DEFAULT_RT_PRIORITY,
            period_ms: DEFAULT_PERIOD_MS,
            cycle_bound: DEFAULT_CYCLE_BOUND,
            workload_iterations: DEFAULT_WORKLOAD_ITERATIONS,
            thread_stack_size: 256 * 1024,
            shutdown_grace_ms: 2 * DEFAULT_PERIOD_MS,
        }
    }
}

impl GatewayConfig {
    /// Create a configuration holding the default constants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listening address.
    #[must_use]
    pub const fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Replace the origin allow-list.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: impl IntoIterator<Item = IpAddr>) -> Self {
        self.allowed_origins = origins.into_iter().collect();
        self
    }

    /// Set the single authorized identity.
    #[must_use]
    pub fn with_authorized_identity(mut self, identity: impl Into<String>) -> Self {
        self.authorized_identity = identity.into();
        self
    }

    /// Set the maximum identity length.
    #[must_use]
    pub const fn with_max_identity_len(mut self, len: usize) -> Self {
        self.max_identity_len = len;
        self
    }

    /// Set the real-time priority.
    #[must_use]
    pub const fn with_rt_priority(mut self, priority: i32) -> Self {
        self.rt_priority = priority;
        self
    }

    /// Set the scheduling period.
    #[must_use]
    pub const fn with_period_ms(mut self, period_ms: u64) -> Self {
        self.period_ms = period_ms;
        self
    }

    /// Set the cycle bound.
    #[must_use]
    pub const fn with_cycle_bound(mut self, bound: u32) -> Self {
        self.cycle_bound = bound;
        self
    }

    /// Set the demonstration workload size.
    #[must_use]
    pub const fn with_workload_iterations(mut self, iterations: u32) -> Self {
        self.workload_iterations = iterations;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace_ms(mut self, grace_ms: u64) -> Self {
        self.shutdown_grace_ms = grace_ms;
        self
    }

    /// Scheduling period as a [`Duration`].
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.allowed_origins.is_empty() {
            return Err("allowed_origins must contain at least one address".into());
        }
        if self.authorized_identity.is_empty() {
            return Err("authorized_identity must not be empty".into());
        }
        if self.max_identity_len == 0 {
            return Err("max_identity_len must be greater than 0".into());
        }
        if self.authorized_identity.len() > self.max_identity_len {
            return Err(format!(
                "authorized_identity is {} bytes, longer than max_identity_len {}",
                self.authorized_identity.len(),
                self.max_identity_len
            ));
        }
        if self
            .authorized_identity
            .bytes()
            .any(|b| b == b'\n' || b == b'\r')
        {
            return Err("authorized_identity must not contain line endings".into());
        }
        if !(MIN_RT_PRIORITY..=MAX_RT_PRIORITY).contains(&self.rt_priority) {
            return Err(format!(
                "rt_priority must be within {MIN_RT_PRIORITY}..={MAX_RT_PRIORITY}"
            ));
        }
        if self.period_ms == 0 {
            return Err("period_ms must be greater than 0".into());
        }
        if self.cycle_bound == 0 {
            return Err("cycle_bound must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_THREAD_STACK_SIZE {
            return Err(format!(
                "thread_stack_size must be at least {MIN_THREAD_STACK_SIZE} bytes"
            ));
        }
        Ok(())
    }

    /// Parse gateway configuration from a JSON string and validate.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = GatewayConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.period(), Duration::from_secs(1));
    }

    #[test]
    fn test_identity_longer_than_limit_is_rejected() {
        let cfg = GatewayConfig::new()
            .with_max_identity_len(3)
            .with_authorized_identity("admin");
        assert!(cfg.validate().is_err());
    }
}
