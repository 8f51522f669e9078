//! Tests for clocks and the shutdown signal

use std::time::Duration;

use rt_gatekeeper::core::ShutdownSignal;
use rt_gatekeeper::util::{Clock, ManualClock, MonotonicClock, WaitError};

#[test]
fn test_monotonic_clock_never_goes_back() {
    let clock = MonotonicClock::new();
    let a = clock.now().unwrap();
    let b = clock.now().unwrap();
    assert!(b >= a);
}

#[test]
fn test_monotonic_sleep_until_past_deadline_returns() {
    let clock = MonotonicClock::new();
    let now = clock.now().unwrap();
    clock.sleep_until(now.saturating_sub(Duration::from_millis(5))).unwrap();
}

#[test]
fn test_monotonic_sleep_until_reaches_deadline() {
    let clock = MonotonicClock::new();
    let deadline = clock.now().unwrap() + Duration::from_millis(15);
    clock.sleep_until(deadline).unwrap();
    assert!(clock.now().unwrap() >= deadline);
}

#[test]
fn test_manual_clock_shares_timeline_between_clones() {
    let clock = ManualClock::starting_at(Duration::from_secs(3));
    let handle = clock.clone();
    handle.advance(Duration::from_millis(500));
    assert_eq!(clock.now().unwrap(), Duration::from_millis(3_500));
}

#[test]
fn test_manual_clock_injected_failures() {
    let clock = ManualClock::default();
    clock.interrupt_next_sleeps(1);
    assert_eq!(clock.sleep_until(Duration::from_secs(1)), Err(WaitError::Interrupted));
    clock.sleep_until(Duration::from_secs(1)).unwrap();

    clock.fail_sleep_at(1);
    assert!(matches!(
        clock.sleep_until(Duration::from_secs(2)),
        Err(WaitError::Failed(_))
    ));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
}

#[test]
fn test_shutdown_signal_triggers_once() {
    let signal = ShutdownSignal::new();
    let observer = signal.clone();
    assert!(observer.is_running());
    assert!(signal.trigger());
    assert!(!signal.trigger());
    assert!(!observer.is_running());
}
