//! Monotonic time sources for absolute-time scheduling.
//!
//! Timestamps are expressed as a [`Duration`] since the clock's own epoch
//! (for [`MonotonicClock`] on Linux that is the kernel's `CLOCK_MONOTONIC`
//! origin). Wall-clock adjustments never affect these readings.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

/// Failure while reading a clock or suspending until a deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The wait was interrupted (e.g. by a signal) before the deadline.
    #[error("wait interrupted")]
    Interrupted,
    /// The wait or clock read failed for any other reason.
    #[error("{0}")]
    Failed(String),
}

/// A monotonic clock able to suspend the calling thread until an absolute instant.
pub trait Clock: Send {
    /// Current reading of the clock.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Failed`] if the clock cannot be read.
    fn now(&self) -> Result<Duration, WaitError>;

    /// Block until the clock reads at least `deadline`.
    ///
    /// Returns immediately if the deadline has already passed.
    ///
    /// # Errors
    ///
    /// [`WaitError::Interrupted`] when the wait ended early and should be
    /// re-entered, [`WaitError::Failed`] for anything unrecoverable.
    fn sleep_until(&self, deadline: Duration) -> Result<(), WaitError>;
}

/// The system monotonic clock.
///
/// On Linux this reads `CLOCK_MONOTONIC` and sleeps with
/// `clock_nanosleep(TIMER_ABSTIME)`, so the kernel wakes the thread at the
/// absolute deadline. Other platforms fall back to [`std::time::Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    #[cfg(not(target_os = "linux"))]
    anchor: std::time::Instant,
}

impl MonotonicClock {
    /// Create a handle to the system monotonic clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "linux"))]
            anchor: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl Clock for MonotonicClock {
    fn now(&self) -> Result<Duration, WaitError> {
        use nix::time::{clock_gettime, ClockId};

        clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map(Duration::from)
            .map_err(|errno| WaitError::Failed(format!("clock_gettime: {errno}")))
    }

    fn sleep_until(&self, deadline: Duration) -> Result<(), WaitError> {
        use nix::errno::Errno;
        use nix::sys::time::TimeSpec;
        use nix::time::{clock_nanosleep, ClockId, ClockNanosleepFlags};

        let request = TimeSpec::from(deadline);
        match clock_nanosleep(
            ClockId::CLOCK_MONOTONIC,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &request,
        ) {
            Ok(_) => Ok(()),
            Err(Errno::EINTR) => Err(WaitError::Interrupted),
            Err(errno) => Err(WaitError::Failed(format!("clock_nanosleep: {errno}"))),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Clock for MonotonicClock {
    fn now(&self) -> Result<Duration, WaitError> {
        Ok(self.anchor.elapsed())
    }

    fn sleep_until(&self, deadline: Duration) -> Result<(), WaitError> {
        let remaining = deadline.saturating_sub(self.anchor.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
    pending_interrupts: u32,
    fail_on_sleep: Option<usize>,
}

/// Deterministic clock for simulation and tests.
///
/// Time only moves when [`ManualClock::advance`] is called or when a sleep
/// jumps the clock forward to its deadline. Clones share the same timeline,
/// so a test can keep a handle while a scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::default();
        clock.state.lock().now = start;
        clock
    }

    /// Move the clock forward, simulating work done between waits.
    pub fn advance(&self, by: Duration) {
        self.state.lock().now += by;
    }

    /// Make the next `count` sleeps return [`WaitError::Interrupted`] once each.
    pub fn interrupt_next_sleeps(&self, count: u32) {
        self.state.lock().pending_interrupts = count;
    }

    /// Make the sleep with the given zero-based ordinal fail permanently.
    pub fn fail_sleep_at(&self, ordinal: usize) {
        self.state.lock().fail_on_sleep = Some(ordinal);
    }

    /// Every deadline passed to a completed `sleep_until`, in call order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Duration, WaitError> {
        Ok(self.state.lock().now)
    }

    fn sleep_until(&self, deadline: Duration) -> Result<(), WaitError> {
        let mut state = self.state.lock();
        if state.pending_interrupts > 0 {
            state.pending_interrupts -= 1;
            return Err(WaitError::Interrupted);
        }
        if state.fail_on_sleep == Some(state.sleeps.len()) {
            return Err(WaitError::Failed("injected wait failure".into()));
        }
        state.sleeps.push(deadline);
        if deadline > state.now {
            state.now = deadline;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_jumps_forward() {
        let clock = ManualClock::starting_at(Duration::from_secs(10));
        clock.sleep_until(Duration::from_secs(11)).unwrap();
        assert_eq!(clock.now().unwrap(), Duration::from_secs(11));

        // A deadline in the past does not move time backwards.
        clock.sleep_until(Duration::from_secs(5)).unwrap();
        assert_eq!(clock.now().unwrap(), Duration::from_secs(11));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn test_manual_clock_interrupts_then_succeeds() {
        let clock = ManualClock::default();
        clock.interrupt_next_sleeps(1);
        assert_eq!(
            clock.sleep_until(Duration::from_millis(5)),
            Err(WaitError::Interrupted)
        );
        assert!(clock.sleep_until(Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn test_monotonic_clock_sleeps_to_absolute_deadline() {
        let clock = MonotonicClock::new();
        let start = clock.now().unwrap();
        let deadline = start + Duration::from_millis(20);
        clock.sleep_until(deadline).unwrap();
        assert!(clock.now().unwrap() >= deadline);
    }
}
