//! Two-stage authorization: origin allow-list, then credential exchange.

use std::fmt;
use std::io::Write;

use tracing::{debug, info, warn};

use super::credential::{CredentialFailure, CredentialGate, CredentialVerdict};
use super::origin::OriginGate;
use super::protocol::ORIGIN_REJECTED;
use super::session::{AuthState, Connection, Session};
use crate::config::GatewayConfig;

/// Why a session was or was not authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationReason {
    /// Both gates passed.
    Authorized,
    /// The peer address is not allow-listed.
    OriginNotAllowed,
    /// The peer sent a different identity.
    IdentityMismatch,
    /// The identity line exceeded the length limit.
    IdentityTooLong,
    /// The peer closed the connection before answering.
    PeerClosed,
    /// The transport failed during the exchange.
    TransportFailure,
}

impl AuthorizationReason {
    /// The session state this reason settles into.
    #[must_use]
    pub const fn state(self) -> AuthState {
        match self {
            Self::Authorized => AuthState::Authorized,
            Self::OriginNotAllowed => AuthState::OriginRejected,
            Self::IdentityMismatch
            | Self::IdentityTooLong
            | Self::PeerClosed
            | Self::TransportFailure => AuthState::CredentialRejected,
        }
    }
}

impl fmt::Display for AuthorizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Authorized => "authorized",
            Self::OriginNotAllowed => "origin not allowed",
            Self::IdentityMismatch => "identity mismatch",
            Self::IdentityTooLong => "identity too long",
            Self::PeerClosed => "peer closed",
            Self::TransportFailure => "transport failure",
        };
        f.write_str(text)
    }
}

/// Immutable outcome of one pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuthorizationResult {
    /// Whether a session runner may be started.
    pub allowed: bool,
    /// Why.
    pub reason: AuthorizationReason,
}

impl AuthorizationResult {
    const fn from_reason(reason: AuthorizationReason) -> Self {
        Self {
            allowed: matches!(reason, AuthorizationReason::Authorized),
            reason,
        }
    }
}

/// Runs [`OriginGate`] then [`CredentialGate`], stopping at the first failure.
///
/// A rejected origin never sees the challenge prompt.
#[derive(Debug, Clone)]
pub struct AuthorizationPipeline {
    origin_gate: OriginGate,
    credential_gate: CredentialGate,
}

impl AuthorizationPipeline {
    /// Compose a pipeline from its two gates.
    #[must_use]
    pub const fn new(origin_gate: OriginGate, credential_gate: CredentialGate) -> Self {
        Self {
            origin_gate,
            credential_gate,
        }
    }

    /// Build both gates from configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            OriginGate::new(config.allowed_origins.iter().copied()),
            CredentialGate::new(config.authorized_identity.clone(), config.max_identity_len),
        )
    }

    /// The origin stage.
    #[must_use]
    pub const fn origin_gate(&self) -> &OriginGate {
        &self.origin_gate
    }

    /// Decide whether `session` may obtain a real-time execution context.
    ///
    /// Settles the session's authorization state. Rejections are reported to
    /// the peer with an explicit line before returning. A session that is
    /// already settled gets its recorded decision back and its connection is
    /// not touched again.
    pub fn authorize<C: Connection>(&self, session: &mut Session<C>) -> AuthorizationResult {
        if let Some(previous) = session.authorization() {
            debug!(
                session_id = %session.id(),
                state = %session.state(),
                "Session already settled, no second challenge"
            );
            return previous;
        }

        let reason = self.decide(session);
        let result = AuthorizationResult::from_reason(reason);
        if session.transition(reason.state()) {
            session.record_authorization(result);
        }

        if result.allowed {
            info!(
                session_id = %session.id(),
                origin = %session.origin(),
                "Session fully authorized"
            );
        } else {
            warn!(
                session_id = %session.id(),
                origin = %session.origin(),
                reason = %reason,
                "Session rejected"
            );
        }
        result
    }

    fn decide<C: Connection>(&self, session: &mut Session<C>) -> AuthorizationReason {
        let origin = session.origin();
        let session_id = session.id();
        let Ok(connection) = session.connection_mut() else {
            return AuthorizationReason::TransportFailure;
        };

        if !self.origin_gate.check(origin) {
            if let Err(e) = connection
                .write_all(ORIGIN_REJECTED.as_bytes())
                .and_then(|()| connection.flush())
            {
                warn!(session_id = %session_id, error = %e, "Failed to deliver origin rejection");
            }
            return AuthorizationReason::OriginNotAllowed;
        }

        match self.credential_gate.challenge(connection) {
            Ok(verdict) => {
                let reason = match &verdict {
                    CredentialVerdict::Accepted { .. } => AuthorizationReason::Authorized,
                    CredentialVerdict::Rejected(CredentialFailure::Mismatch { .. }) => {
                        AuthorizationReason::IdentityMismatch
                    }
                    CredentialVerdict::Rejected(CredentialFailure::TooLong) => {
                        AuthorizationReason::IdentityTooLong
                    }
                    CredentialVerdict::Rejected(CredentialFailure::PeerClosed) => {
                        AuthorizationReason::PeerClosed
                    }
                };
                if let Some(claimed) = verdict.claimed_identity() {
                    session.set_claimed_identity(claimed.to_string());
                }
                reason
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Credential exchange failed");
                AuthorizationReason::TransportFailure
            }
        }
    }
}
