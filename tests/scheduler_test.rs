//! Scheduler tests against the real monotonic clock and a simulated one.
//!
//! The real-clock tests use short periods so they run in well under a
//! second; bounds on timing are loose enough for a loaded CI host.

use std::thread;
use std::time::{Duration, Instant};

use rt_gatekeeper::core::{PeriodicScheduler, SchedulerPhase, ShutdownSignal, Tick};
use rt_gatekeeper::util::{Clock, ManualClock, MonotonicClock};

fn collect<K: Clock>(scheduler: &mut PeriodicScheduler<K>, shutdown: &ShutdownSignal) -> Vec<u32> {
    let mut indices = Vec::new();
    while let Tick::Cycle(record) = scheduler.tick(shutdown).unwrap() {
        indices.push(record.index);
    }
    indices
}

#[test]
fn test_processing_delay_does_not_accumulate() {
    let period = Duration::from_millis(50);
    let delay = Duration::from_millis(20);
    let bound = 5u32;
    let shutdown = ShutdownSignal::new();
    let mut scheduler = PeriodicScheduler::new(MonotonicClock::new(), period, bound);

    let started = Instant::now();
    let mut records = Vec::new();
    loop {
        match scheduler.tick(&shutdown).unwrap() {
            Tick::Cycle(record) => {
                records.push(record);
                thread::sleep(delay);
            }
            Tick::Completed => break,
            Tick::Cancelled => panic!("unexpected cancellation"),
        }
    }
    let total = started.elapsed();

    assert_eq!(records.len(), bound as usize);
    // Relative sleeping would take bound * (period + delay) = 350 ms.
    assert!(total >= period * bound, "finished too early: {total:?}");
    assert!(total < Duration::from_millis(340), "drift accumulated: {total:?}");

    let origin = scheduler.state().unwrap().origin();
    for record in &records {
        assert_eq!(record.target, origin + period * record.index);
        assert!(record.woke_at >= record.target);
    }
}

#[test]
fn test_real_clock_indices_strictly_increase_and_stop_at_bound() {
    let shutdown = ShutdownSignal::new();
    let mut scheduler = PeriodicScheduler::new(MonotonicClock::new(), Duration::from_millis(5), 8);

    let indices = collect(&mut scheduler, &shutdown);

    assert_eq!(indices, (1..=8).collect::<Vec<_>>());
    assert_eq!(scheduler.phase(), &SchedulerPhase::Completed);
    assert_eq!(scheduler.tick(&shutdown).unwrap(), Tick::Completed);
    assert_eq!(scheduler.cycles_executed(), 8);
}

#[test]
fn test_shutdown_from_another_thread_stops_between_cycles() {
    let shutdown = ShutdownSignal::new();
    let mut scheduler =
        PeriodicScheduler::new(MonotonicClock::new(), Duration::from_millis(10), 1_000);

    let trigger = shutdown.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(55));
        trigger.trigger()
    });

    let indices = collect(&mut scheduler, &shutdown);
    assert!(stopper.join().unwrap());

    assert!(!indices.is_empty());
    assert!(indices.len() < 1_000);
    assert!(matches!(scheduler.phase(), SchedulerPhase::Cancelled(_)));
}

#[test]
fn test_simulated_long_run_has_zero_drift() {
    let clock = ManualClock::starting_at(Duration::from_secs(1));
    let period = Duration::from_millis(1);
    let shutdown = ShutdownSignal::new();
    let mut scheduler = PeriodicScheduler::new(clock.clone(), period, 10_000);

    while let Tick::Cycle(_) = scheduler.tick(&shutdown).unwrap() {
        // Every cycle overruns by a little, never by a full period.
        clock.advance(Duration::from_micros(300));
    }

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 10_000);
    assert_eq!(sleeps[9_999], Duration::from_secs(1) + period * 10_000);
    let state = scheduler.state().unwrap();
    assert_eq!(state.max_lateness(), Duration::ZERO);
}
