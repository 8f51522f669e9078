//! Drift-free periodic scheduling against an absolute monotonic timeline.
//!
//! The scheduler stores the origin captured when it is armed and advances a
//! target by exactly one period per cycle. Each wait is for the absolute
//! target, so time spent processing a cycle shortens the next wait instead of
//! pushing every later cycle back.
//!
//! ```text
//! Idle --arm--> Armed --tick--> Running --tick--> ... --> Completed
//!                  \                 \
//!                   +-----------------+--> Cancelled (shutdown / wait failure)
//! ```

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, trace};

use super::error::GatewayError;
use super::shutdown::ShutdownSignal;
use crate::util::clock::{Clock, WaitError};

/// Why a scheduler stopped before reaching its bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// The process-wide shutdown flag was observed between cycles.
    Shutdown,
    /// The absolute-time wait failed with a non-interrupt error.
    WaitFailed(String),
}

/// Lifecycle phase of a [`PeriodicScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Created, origin not yet captured.
    Idle,
    /// Origin captured, no cycle produced yet.
    Armed,
    /// At least one cycle produced, bound not yet reached.
    Running,
    /// The cycle bound was reached.
    Completed,
    /// Stopped early.
    Cancelled(CancelCause),
}

impl SchedulerPhase {
    /// Whether no further cycles can be produced.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled(_))
    }
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Armed => f.write_str("armed"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Cancelled(CancelCause::Shutdown) => f.write_str("cancelled(shutdown)"),
            Self::Cancelled(CancelCause::WaitFailed(reason)) => {
                write!(f, "cancelled(wait failed: {reason})")
            }
        }
    }
}

/// One elapsed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRecord {
    /// 1-based cycle index.
    pub index: u32,
    /// Absolute wake time the scheduler asked for: `origin + index * period`.
    pub target: Duration,
    /// Clock reading taken right after the wait returned.
    pub woke_at: Duration,
    /// Schedule origin captured when the scheduler was armed.
    pub origin: Duration,
    /// How far past the target the thread actually resumed.
    pub lateness: Duration,
}

impl CycleRecord {
    /// Time from the schedule origin to the wake-up.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.woke_at.saturating_sub(self.origin)
    }
}

/// Mutable timing cursor for one running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    origin: Duration,
    period: Duration,
    next_target: Duration,
    cycle_index: u32,
    cycle_bound: u32,
    max_lateness: Duration,
    total_lateness: Duration,
}

impl ScheduleState {
    fn new(origin: Duration, period: Duration, cycle_bound: u32) -> Self {
        Self {
            origin,
            period,
            next_target: origin,
            cycle_index: 0,
            cycle_bound,
            max_lateness: Duration::ZERO,
            total_lateness: Duration::ZERO,
        }
    }

    /// Origin timestamp captured when armed.
    #[must_use]
    pub const fn origin(&self) -> Duration {
        self.origin
    }

    /// Fixed period length.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Number of cycles produced so far.
    #[must_use]
    pub const fn cycle_index(&self) -> u32 {
        self.cycle_index
    }

    /// Maximum number of cycles.
    #[must_use]
    pub const fn cycle_bound(&self) -> u32 {
        self.cycle_bound
    }

    /// Target of the most recent cycle (the origin before the first one).
    #[must_use]
    pub const fn current_target(&self) -> Duration {
        self.next_target
    }

    /// Worst observed lateness.
    #[must_use]
    pub const fn max_lateness(&self) -> Duration {
        self.max_lateness
    }

    /// Mean lateness over the produced cycles.
    #[must_use]
    pub fn mean_lateness(&self) -> Duration {
        if self.cycle_index == 0 {
            Duration::ZERO
        } else {
            self.total_lateness / self.cycle_index
        }
    }

    const fn exhausted(&self) -> bool {
        self.cycle_index >= self.cycle_bound
    }
}

/// Outcome of one [`PeriodicScheduler::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// A period elapsed.
    Cycle(CycleRecord),
    /// The bound has been reached; no more cycles.
    Completed,
    /// Shutdown was observed; no more cycles.
    Cancelled,
}

/// Periodic scheduler bound to one clock, one period and one cycle bound.
pub struct PeriodicScheduler<K: Clock> {
    clock: K,
    period: Duration,
    cycle_bound: u32,
    phase: SchedulerPhase,
    state: Option<ScheduleState>,
}

impl<K: Clock> PeriodicScheduler<K> {
    /// Create an idle scheduler.
    pub const fn new(clock: K, period: Duration, cycle_bound: u32) -> Self {
        Self {
            clock,
            period,
            cycle_bound,
            phase: SchedulerPhase::Idle,
            state: None,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> &SchedulerPhase {
        &self.phase
    }

    /// Timing cursor, once armed.
    #[must_use]
    pub const fn state(&self) -> Option<&ScheduleState> {
        self.state.as_ref()
    }

    /// Cycles produced so far.
    #[must_use]
    pub fn cycles_executed(&self) -> u32 {
        self.state.as_ref().map_or(0, ScheduleState::cycle_index)
    }

    /// Capture the origin timestamp. No-op unless idle.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TimingWait`] if the clock cannot be read; the
    /// scheduler is then cancelled.
    pub fn arm(&mut self) -> Result<(), GatewayError> {
        if self.phase != SchedulerPhase::Idle {
            return Ok(());
        }
        match self.clock.now() {
            Ok(origin) => {
                debug!(
                    origin_ns = origin.as_nanos(),
                    period_ms = self.period.as_millis(),
                    cycle_bound = self.cycle_bound,
                    "Scheduler armed"
                );
                self.state = Some(ScheduleState::new(origin, self.period, self.cycle_bound));
                self.phase = SchedulerPhase::Armed;
                Ok(())
            }
            Err(e) => Err(self.fail(&e)),
        }
    }

    /// Wait for the next period boundary and produce its record.
    ///
    /// Arms the scheduler first if needed. Once terminal, every call returns
    /// the same terminal tick, so no instance ever produces more than its
    /// bound. Shutdown is only observed here, between cycles; a wait already
    /// in progress always runs to its deadline.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TimingWait`] when the wait fails for a reason other
    /// than interruption. The scheduler is cancelled.
    pub fn tick(&mut self, shutdown: &ShutdownSignal) -> Result<Tick, GatewayError> {
        self.arm()?;

        match &self.phase {
            SchedulerPhase::Completed => return Ok(Tick::Completed),
            SchedulerPhase::Cancelled(CancelCause::Shutdown) => return Ok(Tick::Cancelled),
            SchedulerPhase::Cancelled(CancelCause::WaitFailed(reason)) => {
                return Err(GatewayError::TimingWait(reason.clone()));
            }
            SchedulerPhase::Idle | SchedulerPhase::Armed | SchedulerPhase::Running => {}
        }

        let Some(state) = self.state.as_mut() else {
            return Err(self.fail(&WaitError::Failed("scheduler state missing".into())));
        };

        if state.exhausted() {
            debug!(cycles = state.cycle_index, "Scheduler completed");
            self.phase = SchedulerPhase::Completed;
            return Ok(Tick::Completed);
        }
        if !shutdown.is_running() {
            debug!(cycles = state.cycle_index, "Scheduler cancelled by shutdown");
            self.phase = SchedulerPhase::Cancelled(CancelCause::Shutdown);
            return Ok(Tick::Cancelled);
        }

        // Advance from the previous target, never from "now".
        let target = state.next_target + state.period;
        loop {
            match self.clock.sleep_until(target) {
                Ok(()) => break,
                Err(WaitError::Interrupted) => {
                    trace!(target_ns = target.as_nanos(), "Wait interrupted, re-entering");
                }
                Err(e) => return Err(self.fail(&e)),
            }
        }
        let woke_at = match self.clock.now() {
            Ok(now) => now,
            Err(e) => return Err(self.fail(&e)),
        };

        let Some(state) = self.state.as_mut() else {
            return Err(self.fail(&WaitError::Failed("scheduler state missing".into())));
        };
        state.next_target = target;
        state.cycle_index += 1;
        let lateness = woke_at.saturating_sub(target);
        state.max_lateness = state.max_lateness.max(lateness);
        state.total_lateness += lateness;
        self.phase = SchedulerPhase::Running;

        trace!(
            cycle = state.cycle_index,
            lateness_us = lateness.as_micros(),
            "Cycle elapsed"
        );

        Ok(Tick::Cycle(CycleRecord {
            index: state.cycle_index,
            target,
            woke_at,
            origin: state.origin,
            lateness,
        }))
    }

    fn fail(&mut self, cause: &WaitError) -> GatewayError {
        let reason = cause.to_string();
        error!(
            error = %reason,
            cycles = self.cycles_executed(),
            "Scheduler wait failed, cancelling"
        );
        self.phase = SchedulerPhase::Cancelled(CancelCause::WaitFailed(reason.clone()));
        GatewayError::TimingWait(reason)
    }
}

impl<K: Clock> fmt::Debug for PeriodicScheduler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("period", &self.period)
            .field("cycle_bound", &self.cycle_bound)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::clock::ManualClock;

    const PERIOD: Duration = Duration::from_millis(100);

    #[test]
    fn test_targets_are_origin_plus_k_periods() {
        let clock = ManualClock::starting_at(Duration::from_secs(50));
        let shutdown = ShutdownSignal::new();
        let mut scheduler = PeriodicScheduler::new(clock.clone(), PERIOD, 4);

        for k in 1..=4u32 {
            match scheduler.tick(&shutdown).unwrap() {
                Tick::Cycle(record) => {
                    assert_eq!(record.index, k);
                    assert_eq!(record.target, Duration::from_secs(50) + PERIOD * k);
                }
                other => panic!("expected cycle {k}, got {other:?}"),
            }
            // Processing time between cycles must not shift later targets.
            clock.advance(Duration::from_millis(30));
        }
        assert_eq!(scheduler.tick(&shutdown).unwrap(), Tick::Completed);
        assert_eq!(scheduler.tick(&shutdown).unwrap(), Tick::Completed);
        assert_eq!(*scheduler.phase(), SchedulerPhase::Completed);
        assert_eq!(scheduler.cycles_executed(), 4);
    }

    #[test]
    fn test_interrupted_wait_reenters_same_target() {
        let clock = ManualClock::default();
        clock.interrupt_next_sleeps(3);
        let shutdown = ShutdownSignal::new();
        let mut scheduler = PeriodicScheduler::new(clock.clone(), PERIOD, 1);

        let Tick::Cycle(record) = scheduler.tick(&shutdown).unwrap() else {
            panic!("expected a cycle");
        };
        assert_eq!(record.index, 1);
        assert_eq!(clock.sleeps(), vec![PERIOD]);
    }

    #[test]
    fn test_wait_failure_cancels_instance() {
        let clock = ManualClock::default();
        clock.fail_sleep_at(1);
        let shutdown = ShutdownSignal::new();
        let mut scheduler = PeriodicScheduler::new(clock, PERIOD, 5);

        assert!(matches!(scheduler.tick(&shutdown), Ok(Tick::Cycle(_))));
        assert!(matches!(
            scheduler.tick(&shutdown),
            Err(GatewayError::TimingWait(_))
        ));
        assert!(matches!(
            scheduler.phase(),
            SchedulerPhase::Cancelled(CancelCause::WaitFailed(_))
        ));
        // Stays cancelled.
        assert!(scheduler.tick(&shutdown).is_err());
        assert_eq!(scheduler.cycles_executed(), 1);
    }

    #[test]
    fn test_shutdown_observed_between_cycles() {
        let clock = ManualClock::default();
        let shutdown = ShutdownSignal::new();
        let mut scheduler = PeriodicScheduler::new(clock, PERIOD, 10);

        assert!(matches!(scheduler.tick(&shutdown), Ok(Tick::Cycle(_))));
        shutdown.trigger();
        assert_eq!(scheduler.tick(&shutdown).unwrap(), Tick::Cancelled);
        assert_eq!(
            *scheduler.phase(),
            SchedulerPhase::Cancelled(CancelCause::Shutdown)
        );
        assert_eq!(scheduler.cycles_executed(), 1);
    }

    #[test]
    fn test_lateness_accounting() {
        let clock = ManualClock::default();
        let shutdown = ShutdownSignal::new();
        let mut scheduler = PeriodicScheduler::new(clock.clone(), PERIOD, 3);

        scheduler.tick(&shutdown).unwrap();
        // Overrun the next boundary by 20ms: the next wait returns immediately.
        clock.advance(PERIOD + Duration::from_millis(20));
        let Tick::Cycle(late) = scheduler.tick(&shutdown).unwrap() else {
            panic!("expected a cycle");
        };
        assert_eq!(late.lateness, Duration::from_millis(20));
        assert_eq!(late.target, PERIOD * 2);

        let state = scheduler.state().unwrap();
        assert_eq!(state.max_lateness(), Duration::from_millis(20));
        assert_eq!(state.mean_lateness(), Duration::from_millis(10));
    }
}
