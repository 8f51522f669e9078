//! Error types for gateway operations.

use std::io;
use std::net::IpAddr;

use thiserror::Error;

/// Errors produced by gateway components.
///
/// Every variant is contained within the session that raised it; none of them
/// stop the serving process or affect sibling sessions.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The session's network origin is not on the allow-list.
    #[error("origin {0} is not authorized")]
    OriginRejected(IpAddr),
    /// The peer did not present the authorized identity.
    #[error("credential rejected")]
    CredentialRejected,
    /// Reading from the session transport failed.
    #[error("transport read error: {0}")]
    TransportRead(#[source] io::Error),
    /// Writing to the session transport failed.
    #[error("transport write error: {0}")]
    TransportWrite(#[source] io::Error),
    /// Elevated scheduling could not be obtained; execution continues without it.
    #[error("privilege elevation unavailable: {0}")]
    PrivilegeElevationUnavailable(String),
    /// The absolute-time wait failed; fatal to the scheduler instance only.
    #[error("timing wait failed: {0}")]
    TimingWait(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// Whether the error ends the session at the authorization stage.
    #[must_use]
    pub const fn is_authorization_failure(&self) -> bool {
        matches!(self, Self::OriginRejected(_) | Self::CredentialRejected)
    }

    /// Whether the error leaves the session usable (soft failure).
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::PrivilegeElevationUnavailable(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
