//! Per-connection entry point: authorize, then run the real-time task.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{error, info_span, warn};
use uuid::Uuid;

use super::authorization::{AuthorizationPipeline, AuthorizationResult};
use super::error::GatewayError;
use super::priority::{FifoElevator, PriorityElevator};
use super::runner::{RunReport, SessionRunner};
use super::session::{AuthorizedSession, Connection, Session};
use super::shutdown::ShutdownSignal;
use crate::config::GatewayConfig;

/// What happened to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: Uuid,
    /// Peer address.
    pub origin: IpAddr,
    /// Authorization decision.
    pub authorization: AuthorizationResult,
    /// Run report, present only when the session was authorized and its
    /// thread started.
    pub run: Option<RunReport>,
}

/// Authorization pipeline and session runner sharing one configuration.
#[derive(Debug, Clone)]
pub struct Gateway<E: PriorityElevator = FifoElevator> {
    config: Arc<GatewayConfig>,
    pipeline: AuthorizationPipeline,
    runner: SessionRunner<E>,
    shutdown: ShutdownSignal,
}

impl Gateway<FifoElevator> {
    /// Validate `config` and build a gateway observing `shutdown`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidConfig`] if validation fails.
    pub fn new(config: GatewayConfig, shutdown: ShutdownSignal) -> Result<Self, GatewayError> {
        config.validate().map_err(GatewayError::InvalidConfig)?;
        let config = Arc::new(config);
        Ok(Self {
            pipeline: AuthorizationPipeline::from_config(&config),
            runner: SessionRunner::new(Arc::clone(&config), shutdown.clone()),
            config,
            shutdown,
        })
    }
}

impl<E: PriorityElevator> Gateway<E> {
    /// Replace the priority elevator used by session threads.
    #[must_use]
    pub fn with_elevator<E2: PriorityElevator>(self, elevator: E2) -> Gateway<E2> {
        Gateway {
            config: self.config,
            pipeline: self.pipeline,
            runner: self.runner.with_elevator(elevator),
            shutdown: self.shutdown,
        }
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The authorization stage.
    #[must_use]
    pub const fn pipeline(&self) -> &AuthorizationPipeline {
        &self.pipeline
    }

    /// The run stage.
    #[must_use]
    pub const fn runner(&self) -> &SessionRunner<E> {
        &self.runner
    }

    /// Shutdown flag observed by sessions.
    #[must_use]
    pub const fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Handle one accepted connection from `origin`.
    ///
    /// Blocks the calling thread for the whole task when the peer is
    /// authorized; callers run this on a dedicated thread per connection.
    /// The connection is closed before this returns.
    pub fn handle<C: Connection + 'static>(&self, connection: C, origin: IpAddr) -> SessionSummary {
        let mut session = Session::new(connection, origin);
        let session_id = session.id();
        let span = info_span!("session", session_id = %session_id, origin = %origin);
        let _guard = span.enter();

        let authorization = self.pipeline.authorize(&mut session);
        let run = match AuthorizedSession::try_from_session(session) {
            Ok(authorized) => match self.runner.spawn(authorized) {
                Ok(handle) => match handle.join() {
                    Ok(report) => report,
                    Err(_) => {
                        error!("Session thread panicked");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Session not started");
                    None
                }
            },
            Err(mut rejected) => {
                rejected.release();
                None
            }
        };

        SessionSummary {
            session_id,
            origin,
            authorization,
            run,
        }
    }
}
