//! Tokio accept loop handing each connection to a dedicated OS thread.
//!
//! Accepting is async; sessions are not. Every accepted stream is turned back
//! into a blocking `std::net::TcpStream` and moved into its own named thread,
//! which runs [`Gateway::handle`] and reports a [`SessionSummary`] over a
//! channel when done. Real-time waits therefore never block the runtime.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::core::{Gateway, PriorityElevator, RunOutcome, SessionSummary};
use crate::infra::peer_origin;

/// Tallies reported when the server stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeReport {
    /// Connections accepted.
    pub accepted: u64,
    /// Sessions that passed both gates.
    pub authorized: u64,
    /// Sessions rejected by either gate.
    pub rejected: u64,
    /// Authorized sessions that ran to their cycle bound.
    pub completed_runs: u64,
    /// Sessions still running when the grace period ran out.
    pub abandoned: usize,
}

impl ServeReport {
    fn absorb(&mut self, summary: &SessionSummary) {
        if summary.authorization.allowed {
            self.authorized += 1;
        } else {
            self.rejected += 1;
        }
        if summary
            .run
            .as_ref()
            .is_some_and(|run| run.outcome == RunOutcome::Completed)
        {
            self.completed_runs += 1;
        }
    }
}

#[derive(Debug)]
struct LiveSession {
    origin: IpAddr,
    accepted_at: Instant,
}

/// Connections currently being served.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    live: Mutex<HashMap<u64, LiveSession>>,
}

impl SessionRegistry {
    fn insert(&self, conn_id: u64, origin: IpAddr) {
        self.live.lock().insert(
            conn_id,
            LiveSession {
                origin,
                accepted_at: Instant::now(),
            },
        );
    }

    fn remove(&self, conn_id: u64) {
        if let Some(session) = self.live.lock().remove(&conn_id) {
            debug!(
                conn_id,
                origin = %session.origin,
                held_ms = session.accepted_at.elapsed().as_millis(),
                "Connection finished"
            );
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    /// Whether no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    /// Origins of the live connections.
    #[must_use]
    pub fn origins(&self) -> Vec<IpAddr> {
        self.live.lock().values().map(|s| s.origin).collect()
    }
}

type Completion = (u64, SessionSummary);

/// Bind the configured address and serve until `stop` resolves.
///
/// # Errors
///
/// Returns the bind error or a fatal accept-loop error.
pub async fn run_server<E, F>(gateway: Arc<Gateway<E>>, stop: F) -> io::Result<ServeReport>
where
    E: PriorityElevator,
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(gateway.config().bind_addr).await?;
    serve(listener, gateway, stop).await
}

/// Serve connections from `listener` until `stop` resolves.
///
/// On stop the shutdown flag is raised, accepting ends, and live sessions get
/// the configured grace period to observe the flag between cycles.
///
/// # Errors
///
/// Returns an error only if the listener's local address cannot be read.
pub async fn serve<E, F>(
    listener: TcpListener,
    gateway: Arc<Gateway<E>>,
    stop: F,
) -> io::Result<ServeReport>
where
    E: PriorityElevator,
    F: Future<Output = ()>,
{
    let local_addr = listener.local_addr()?;
    let (done_tx, done_rx) = unbounded::<Completion>();
    let registry = Arc::new(SessionRegistry::default());
    let mut report = ServeReport::default();
    let mut next_conn_id = 0u64;

    info!(
        addr = %local_addr,
        allowed = ?gateway.config().allowed_origins,
        "Gateway listening"
    );

    tokio::pin!(stop);
    loop {
        for (conn_id, summary) in done_rx.try_iter() {
            registry.remove(conn_id);
            report.absorb(&summary);
        }
        if !gateway.shutdown().is_running() {
            break;
        }

        tokio::select! {
            () = &mut stop => {
                info!("Shutdown requested");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                report.accepted += 1;
                next_conn_id += 1;
                dispatch(
                    next_conn_id,
                    stream,
                    peer,
                    Arc::clone(&gateway),
                    Arc::clone(&registry),
                    done_tx.clone(),
                );
            }
        }
    }

    gateway.shutdown().trigger();
    drop(listener);
    drop(done_tx);

    let grace = gateway.config().shutdown_grace();
    let drain_registry = Arc::clone(&registry);
    let drained = tokio::task::spawn_blocking(move || drain(&done_rx, &drain_registry, grace))
        .await
        .unwrap_or_default();
    for summary in &drained {
        report.absorb(summary);
    }
    report.abandoned = registry.len();
    if report.abandoned > 0 {
        warn!(
            abandoned = report.abandoned,
            origins = ?registry.origins(),
            "Sessions still running after grace period"
        );
    }

    info!(
        accepted = report.accepted,
        authorized = report.authorized,
        rejected = report.rejected,
        completed = report.completed_runs,
        "Gateway stopped"
    );
    Ok(report)
}

fn dispatch<E: PriorityElevator>(
    conn_id: u64,
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    gateway: Arc<Gateway<E>>,
    registry: Arc<SessionRegistry>,
    done_tx: Sender<Completion>,
) {
    let stream = match stream
        .into_std()
        .and_then(|s| s.set_nonblocking(false).map(|()| s))
    {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Could not take ownership of accepted stream");
            return;
        }
    };
    let origin = peer_origin(&stream).unwrap_or_else(|_| peer.ip().to_canonical());

    registry.insert(conn_id, origin);
    let spawned = thread::Builder::new()
        .name(format!("conn-{conn_id}"))
        .stack_size(gateway.config().thread_stack_size)
        .spawn(move || {
            let summary = gateway.handle(stream, origin);
            let _ = done_tx.send((conn_id, summary));
        });

    if let Err(e) = spawned {
        error!(origin = %origin, error = %e, "Failed to spawn connection thread");
        registry.remove(conn_id);
    }
}

fn drain(
    done_rx: &Receiver<Completion>,
    registry: &SessionRegistry,
    grace: Duration,
) -> Vec<SessionSummary> {
    let deadline = Instant::now() + grace;
    let mut drained = Vec::new();
    while !registry.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done_rx.recv_timeout(remaining) {
            Ok((conn_id, summary)) => {
                registry.remove(conn_id);
                drained.push(summary);
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    drained
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
