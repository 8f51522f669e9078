//! Sessions: one connection, its origin, and its authorization state.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::IpAddr;

use tracing::{debug, warn};
use uuid::Uuid;

use super::authorization::AuthorizationResult;

/// Bidirectional byte stream carrying one session.
///
/// The gateway reads the identity line from it and writes prompts and cycle
/// records to it. Implementations release the underlying handle in
/// [`Connection::close`].
pub trait Connection: Read + Write + Send {
    /// Close the connection. Called exactly once when the session is released.
    ///
    /// # Errors
    ///
    /// Returns the transport error raised while closing; callers only log it.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Authorization state of a session.
///
/// Transitions are one-directional: `Unauthenticated` moves to exactly one
/// of the three settled states and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AuthState {
    /// No decision yet.
    Unauthenticated,
    /// Origin address not on the allow-list.
    OriginRejected,
    /// Credential exchange failed.
    CredentialRejected,
    /// Both gates passed.
    Authorized,
}

impl AuthState {
    /// Whether a decision has been made.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::OriginRejected => "origin_rejected",
            Self::CredentialRejected => "credential_rejected",
            Self::Authorized => "authorized",
        };
        f.write_str(name)
    }
}

/// One interaction with a peer, owned by exactly one execution unit.
///
/// Dropping the session closes its connection, so every exit path releases
/// the transport.
pub struct Session<C: Connection> {
    id: Uuid,
    connection: Option<C>,
    origin: IpAddr,
    claimed_identity: Option<String>,
    state: AuthState,
    authorization: Option<AuthorizationResult>,
}

impl<C: Connection> Session<C> {
    /// Create an unauthenticated session for a freshly accepted connection.
    pub fn new(connection: C, origin: IpAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection: Some(connection),
            origin,
            claimed_identity: None,
            state: AuthState::Unauthenticated,
            authorization: None,
        }
    }

    /// Session identifier used for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Remote network address of the peer.
    #[must_use]
    pub const fn origin(&self) -> IpAddr {
        self.origin
    }

    /// Identity the peer supplied during the credential exchange, if any.
    #[must_use]
    pub fn claimed_identity(&self) -> Option<&str> {
        self.claimed_identity.as_deref()
    }

    /// Current authorization state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// The decision that settled this session, once the pipeline has run.
    #[must_use]
    pub const fn authorization(&self) -> Option<AuthorizationResult> {
        self.authorization
    }

    /// Whether the connection has already been released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    /// Mutable access to the transport.
    ///
    /// # Errors
    ///
    /// `NotConnected` once the session has been released.
    pub fn connection_mut(&mut self) -> io::Result<&mut C> {
        self.connection
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "session released"))
    }

    pub(crate) fn record_authorization(&mut self, result: AuthorizationResult) {
        self.authorization = Some(result);
    }

    pub(crate) fn set_claimed_identity(&mut self, identity: String) {
        self.claimed_identity = Some(identity);
    }

    /// Settle the authorization state. Returns `false`, leaving the state
    /// untouched, if the session was already settled or `next` is
    /// `Unauthenticated`.
    pub(crate) fn transition(&mut self, next: AuthState) -> bool {
        if self.state.is_settled() || !next.is_settled() {
            warn!(
                session_id = %self.id,
                from = %self.state,
                to = %next,
                "Rejected authorization state transition"
            );
            return false;
        }
        debug!(session_id = %self.id, to = %next, "Authorization state settled");
        self.state = next;
        true
    }

    /// Close the connection now. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                debug!(session_id = %self.id, error = %e, "Error while closing connection");
            }
            debug!(session_id = %self.id, origin = %self.origin, "Session released");
        }
    }
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("claimed_identity", &self.claimed_identity)
            .field("state", &self.state)
            .field("authorization", &self.authorization)
            .field("released", &self.is_released())
            .finish()
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A session whose state is [`AuthState::Authorized`].
///
/// Only obtainable through [`AuthorizedSession::try_from_session`], so holding
/// one proves both gates passed.
#[derive(Debug)]
pub struct AuthorizedSession<C: Connection> {
    inner: Session<C>,
}

impl<C: Connection> AuthorizedSession<C> {
    /// Promote a session that the pipeline authorized; hands it back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the unchanged session if its state is not `Authorized`.
    pub fn try_from_session(session: Session<C>) -> Result<Self, Session<C>> {
        if session.state() == AuthState::Authorized {
            Ok(Self { inner: session })
        } else {
            Err(session)
        }
    }

    /// Borrow the underlying session.
    #[must_use]
    pub const fn session(&self) -> &Session<C> {
        &self.inner
    }

    /// Mutably borrow the underlying session.
    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.inner
    }

    /// Unwrap into the plain session.
    #[must_use]
    pub fn into_session(self) -> Session<C> {
        self.inner
    }
}
