//! Runs the periodic real-time task for one authorized session.

use std::fmt;
use std::hint::black_box;
use std::io::{self, Write};
use std::net::IpAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::bounded;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::priority::{Elevation, FifoElevator, PriorityElevator};
use super::protocol::{completion_notice, cycle_line, start_notice, START_FAILED};
use super::scheduler::{PeriodicScheduler, Tick};
use super::session::{AuthorizedSession, Connection};
use super::shutdown::ShutdownSignal;
use crate::config::GatewayConfig;
use crate::util::clock::{Clock, MonotonicClock};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// All cycles ran.
    Completed,
    /// Shutdown was observed between cycles.
    Cancelled,
    /// A write to the peer failed; the run stopped at that point.
    SinkClosed,
    /// The absolute-time wait failed.
    TimingFault,
}

impl RunOutcome {
    /// Whether the peer should receive the completion notice.
    #[must_use]
    pub const fn sends_completion(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::SinkClosed => "sink closed",
            Self::TimingFault => "timing fault",
        };
        f.write_str(text)
    }
}

/// Summary of one session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Session identifier.
    pub session_id: Uuid,
    /// Peer address the records were tagged with.
    pub origin: IpAddr,
    /// Result of the priority request.
    pub elevation: Elevation,
    /// Cycles the scheduler produced.
    pub cycles_executed: u32,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Worst wake-up lateness observed.
    pub max_lateness: Duration,
}

/// Drives a [`PeriodicScheduler`] for authorized sessions and streams one
/// record per cycle to the peer.
#[derive(Debug, Clone)]
pub struct SessionRunner<E: PriorityElevator = FifoElevator> {
    config: Arc<GatewayConfig>,
    elevator: E,
    shutdown: ShutdownSignal,
}

impl SessionRunner<FifoElevator> {
    /// Create a runner that requests SCHED_FIFO for each session thread.
    #[must_use]
    pub const fn new(config: Arc<GatewayConfig>, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            elevator: FifoElevator,
            shutdown,
        }
    }
}

impl<E: PriorityElevator> SessionRunner<E> {
    /// Replace the priority elevator.
    #[must_use]
    pub fn with_elevator<E2: PriorityElevator>(self, elevator: E2) -> SessionRunner<E2> {
        SessionRunner {
            config: self.config,
            elevator,
            shutdown: self.shutdown,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run on the calling thread against the system monotonic clock.
    pub fn run<C: Connection>(&self, session: AuthorizedSession<C>) -> RunReport {
        self.run_with_clock(session, MonotonicClock::new())
    }

    /// Run on the calling thread against `clock`.
    ///
    /// The session is released before this returns, whatever the outcome.
    pub fn run_with_clock<C: Connection, K: Clock>(
        &self,
        mut session: AuthorizedSession<C>,
        clock: K,
    ) -> RunReport {
        let session_id = session.session().id();
        let origin = session.session().origin();
        let span = info_span!("rt_session", session_id = %session_id, origin = %origin);
        let _guard = span.enter();

        info!("Real-time task started");
        let elevation = self.elevator.elevate(self.config.rt_priority);

        let mut scheduler =
            PeriodicScheduler::new(clock, self.config.period(), self.config.cycle_bound);
        let outcome = match session.session_mut().connection_mut() {
            Ok(connection) => self.drive(connection, origin, &elevation, &mut scheduler),
            Err(_) => RunOutcome::SinkClosed,
        };
        let cycles_executed = scheduler.cycles_executed();

        if outcome.sends_completion() {
            if let Ok(connection) = session.session_mut().connection_mut() {
                let notice = completion_notice(cycles_executed);
                if let Err(e) = send(connection, &notice) {
                    debug!(error = %e, "Completion notice not delivered");
                }
            }
        }

        let max_lateness = scheduler
            .state()
            .map_or(Duration::ZERO, |state| state.max_lateness());
        info!(
            cycles = cycles_executed,
            outcome = %outcome,
            max_lateness_us = max_lateness.as_micros(),
            "Real-time task finished"
        );

        session.session_mut().release();

        RunReport {
            session_id,
            origin,
            elevation,
            cycles_executed,
            outcome,
            max_lateness,
        }
    }

    /// Run on a dedicated, named OS thread that owns the session.
    ///
    /// If the thread cannot be created the peer is told so and the session
    /// is released; the error is returned.
    ///
    /// # Errors
    ///
    /// The OS error from thread creation.
    pub fn spawn<C: Connection + 'static>(
        &self,
        mut session: AuthorizedSession<C>,
    ) -> io::Result<JoinHandle<Option<RunReport>>> {
        let session_id = session.session().id();
        let (handoff_tx, handoff_rx) = bounded::<AuthorizedSession<C>>(1);
        let runner = self.clone();

        let spawned = thread::Builder::new()
            .name(thread_name(session_id))
            .stack_size(self.config.thread_stack_size)
            .spawn(move || {
                let session = handoff_rx.recv().ok()?;
                Some(runner.run(session))
            });

        match spawned {
            Ok(handle) => {
                if let Err(returned) = handoff_tx.send(session) {
                    // The thread is gone already; dropping releases the session.
                    error!(session_id = %session_id, "Session thread exited before hand-off");
                    drop(returned);
                }
                Ok(handle)
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to start session thread");
                if let Ok(connection) = session.session_mut().connection_mut() {
                    if let Err(notice_err) = send(connection, START_FAILED) {
                        debug!(error = %notice_err, "Start failure notice not delivered");
                    }
                }
                session.session_mut().release();
                Err(e)
            }
        }
    }

    fn drive<C: Connection, K: Clock>(
        &self,
        connection: &mut C,
        origin: IpAddr,
        elevation: &Elevation,
        scheduler: &mut PeriodicScheduler<K>,
    ) -> RunOutcome {
        let start = start_notice(
            self.config.rt_priority,
            elevation.scheduling_label(),
            self.config.cycle_bound,
        );
        if let Err(e) = send(connection, &start) {
            warn!(error = %e, "Peer disconnected before the first cycle");
            return RunOutcome::SinkClosed;
        }

        loop {
            match scheduler.tick(&self.shutdown) {
                Ok(Tick::Cycle(record)) => {
                    debug!(
                        cycle = record.index,
                        lateness_us = record.lateness.as_micros(),
                        "RT-Task executed"
                    );
                    if let Err(e) = send(connection, &cycle_line(&record, origin)) {
                        info!(cycle = record.index, error = %e, "Peer disconnected, stopping");
                        return RunOutcome::SinkClosed;
                    }
                    let _ = black_box(demonstration_workload(self.config.workload_iterations));
                }
                Ok(Tick::Completed) => return RunOutcome::Completed,
                Ok(Tick::Cancelled) => return RunOutcome::Cancelled,
                Err(e) => {
                    error!(error = %e, "Scheduler failed");
                    return RunOutcome::TimingFault;
                }
            }
        }
    }
}

fn send<W: Write + ?Sized>(sink: &mut W, text: &str) -> io::Result<()> {
    sink.write_all(text.as_bytes())?;
    sink.flush()
}

fn thread_name(session_id: Uuid) -> String {
    let simple = session_id.simple().to_string();
    format!("rt-{}", &simple[..8])
}

/// The fixed per-cycle task body: a deterministic arithmetic loop.
#[must_use]
pub fn demonstration_workload(iterations: u32) -> u64 {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = black_box(acc.wrapping_mul(31).wrapping_add(u64::from(i)));
    }
    acc
}
