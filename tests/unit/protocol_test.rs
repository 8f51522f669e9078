//! Tests for the wire protocol helpers

use std::io::Cursor;
use std::time::Duration;

use rt_gatekeeper::core::protocol::{
    completion_notice, cycle_line, parse_completion, parse_cycle_index, read_bounded_line,
    start_notice, LineRead,
};
use rt_gatekeeper::core::CycleRecord;

fn record(index: u32) -> CycleRecord {
    let origin = Duration::from_secs(10);
    let target = origin + Duration::from_secs(u64::from(index));
    CycleRecord {
        index,
        target,
        woke_at: target + Duration::from_micros(250),
        origin,
        lateness: Duration::from_micros(250),
    }
}

#[test]
fn test_cycle_line_format() {
    let line = cycle_line(&record(3), "127.0.0.1".parse().unwrap());
    assert_eq!(
        line,
        "[Cycle 03] RT-Task executed at 13.000 for 127.0.0.1 (elapsed 3.000 s, late 0.250 ms)\n"
    );
    assert_eq!(parse_cycle_index(line.trim_end()), Some(3));
}

#[test]
fn test_start_and_completion_notices() {
    assert_eq!(
        start_notice(50, "SCHED_FIFO", 20),
        "=== REALTIME THREAD STARTED === Priority: 50 (SCHED_FIFO), Cycles: 20\n"
    );
    let done = completion_notice(7);
    assert_eq!(done, "=== RT-THREAD COMPLETED === Executed 7 cycles\n");
    assert_eq!(parse_completion(done.trim_end()), Some(7));
}

#[test]
fn test_parsers_ignore_other_lines() {
    assert_eq!(parse_cycle_index("[Cycle xx] nope"), None);
    assert_eq!(parse_cycle_index("=== RT-THREAD COMPLETED === Executed 7 cycles"), None);
    assert_eq!(parse_completion("[Cycle 01] RT-Task executed"), None);
}

#[test]
fn test_bounded_line_leaves_rest_of_stream() {
    let mut source = Cursor::new(b"admin\r\nnext".to_vec());
    assert_eq!(
        read_bounded_line(&mut source, 50).unwrap(),
        LineRead::Line(b"admin".to_vec())
    );
    assert_eq!(source.position(), 7);
}

#[test]
fn test_bounded_line_limits() {
    let mut exact = Cursor::new(format!("{}\n", "a".repeat(8)).into_bytes());
    assert!(matches!(read_bounded_line(&mut exact, 8).unwrap(), LineRead::Line(l) if l.len() == 8));

    let mut over = Cursor::new(format!("{}\n", "a".repeat(10)).into_bytes());
    assert_eq!(read_bounded_line(&mut over, 8).unwrap(), LineRead::TooLong);

    let mut empty = Cursor::new(Vec::new());
    assert_eq!(read_bounded_line(&mut empty, 8).unwrap(), LineRead::Closed);
}
