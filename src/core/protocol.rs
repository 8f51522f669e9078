//! Line protocol spoken between the gateway and its clients.
//!
//! ```text
//! S: === REMOTE AUTHENTICATION === Username:
//! C: admin
//! S: ✓ Authentication successful! RT access granted.
//! S: === REALTIME THREAD STARTED === Priority: 50 (SCHED_FIFO), Cycles: 3
//! S: [Cycle 01] RT-Task executed at 5012.004 for 127.0.0.1 (elapsed 1.000 s, late 0.057 ms)
//! S: [Cycle 02] ...
//! S: [Cycle 03] ...
//! S: === RT-THREAD COMPLETED === Executed 3 cycles
//! ```
//!
//! A rejected origin sees only [`ORIGIN_REJECTED`]. A connection that ends
//! without the completion line ended abnormally.

use std::io::{self, Read};
use std::net::IpAddr;

use super::scheduler::CycleRecord;

/// Prompt requesting the identity line. Ends in `": "` with no newline.
pub const AUTH_PROMPT: &str = "=== REMOTE AUTHENTICATION === Username: ";
/// Sent when the identity matched.
pub const AUTH_SUCCESS: &str = "✓ Authentication successful! RT access granted.\n";
/// Sent when the identity did not match or could not be read.
pub const AUTH_FAILURE: &str = "✗ Authentication failed! Access denied.\n";
/// The only line a non-allow-listed origin ever receives.
pub const ORIGIN_REJECTED: &str = "✗ IP address not authorized. Connection refused.\n";
/// Sent when the session thread could not be started.
pub const START_FAILED: &str = "✗ Failed to start RT thread\n";

/// Prefix of the start notice.
pub const START_MARKER: &str = "=== REALTIME THREAD STARTED ===";
/// Prefix of every cycle record line.
pub const CYCLE_MARKER: &str = "[Cycle ";
/// Prefix of the completion notice.
pub const COMPLETION_MARKER: &str = "=== RT-THREAD COMPLETED ===";

/// Start notice naming the priority attempted, how it was applied, and the bound.
#[must_use]
pub fn start_notice(priority: i32, scheduling: &str, cycle_bound: u32) -> String {
    format!("{START_MARKER} Priority: {priority} ({scheduling}), Cycles: {cycle_bound}\n")
}

/// One per-cycle record line.
///
/// The timestamp is the monotonic wake time as `seconds.milliseconds`; the
/// elapsed and lateness fields are relative to the schedule origin and the
/// cycle's target wake time.
#[must_use]
pub fn cycle_line(record: &CycleRecord, origin: IpAddr) -> String {
    let woke = record.woke_at;
    let elapsed = record.elapsed();
    format!(
        "{CYCLE_MARKER}{:02}] RT-Task executed at {}.{:03} for {} (elapsed {}.{:03} s, late {}.{:03} ms)\n",
        record.index,
        woke.as_secs(),
        woke.subsec_millis(),
        origin,
        elapsed.as_secs(),
        elapsed.subsec_millis(),
        record.lateness.as_millis(),
        record.lateness.subsec_micros() % 1000,
    )
}

/// Completion notice stating how many cycles actually ran.
#[must_use]
pub fn completion_notice(cycles_executed: u32) -> String {
    format!("{COMPLETION_MARKER} Executed {cycles_executed} cycles\n")
}

/// Extract the cycle index from a cycle record line.
#[must_use]
pub fn parse_cycle_index(line: &str) -> Option<u32> {
    let rest = line.strip_prefix(CYCLE_MARKER)?;
    let end = rest.find(']')?;
    rest[..end].parse().ok()
}

/// Extract the executed-cycle count from a completion notice.
#[must_use]
pub fn parse_completion(line: &str) -> Option<u32> {
    let rest = line.strip_prefix(COMPLETION_MARKER)?.trim();
    let count = rest.strip_prefix("Executed ")?.strip_suffix(" cycles")?;
    count.parse().ok()
}

/// Result of reading one bounded line from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A line with trailing `\r`/`\n` removed.
    Line(Vec<u8>),
    /// The peer closed the stream before sending anything.
    Closed,
    /// More than the allowed number of bytes arrived without a line ending.
    TooLong,
}

/// Read a single line of at most `max_len` bytes (line ending excluded).
///
/// Bytes are consumed one at a time so nothing past the newline is taken
/// from the stream. End of stream after some data terminates the line.
///
/// # Errors
///
/// Propagates any transport error other than `Interrupted`.
pub fn read_bounded_line<R: Read + ?Sized>(source: &mut R, max_len: usize) -> io::Result<LineRead> {
    // Room for the payload plus an optional carriage return.
    let limit = max_len.saturating_add(1);
    let mut line = Vec::with_capacity(limit);
    let mut byte = [0u8; 1];

    loop {
        match source.read(&mut byte) {
            Ok(0) => {
                if line.is_empty() {
                    return Ok(LineRead::Closed);
                }
                break;
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if line.len() == limit {
                    return Ok(LineRead::TooLong);
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    while matches!(line.last(), Some(b'\r' | b'\n')) {
        line.pop();
    }
    if line.len() > max_len {
        return Ok(LineRead::TooLong);
    }
    Ok(LineRead::Line(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_read_bounded_line_strips_crlf() {
        let mut input = Cursor::new(b"admin\r\nleftover".to_vec());
        assert_eq!(
            read_bounded_line(&mut input, 50).unwrap(),
            LineRead::Line(b"admin".to_vec())
        );
        // Nothing past the newline was consumed.
        assert_eq!(input.position(), 7);
    }

    #[test]
    fn test_read_bounded_line_eof_cases() {
        let mut empty = Cursor::new(Vec::new());
        assert_eq!(read_bounded_line(&mut empty, 50).unwrap(), LineRead::Closed);

        let mut unterminated = Cursor::new(b"admin".to_vec());
        assert_eq!(
            read_bounded_line(&mut unterminated, 50).unwrap(),
            LineRead::Line(b"admin".to_vec())
        );
    }

    #[test]
    fn test_read_bounded_line_limit() {
        let mut exact = Cursor::new(b"abcde\r\n".to_vec());
        assert_eq!(
            read_bounded_line(&mut exact, 5).unwrap(),
            LineRead::Line(b"abcde".to_vec())
        );

        let mut over = Cursor::new(b"abcdef\n".to_vec());
        assert_eq!(read_bounded_line(&mut over, 5).unwrap(), LineRead::TooLong);

        let mut flood = Cursor::new(vec![b'x'; 4096]);
        assert_eq!(read_bounded_line(&mut flood, 5).unwrap(), LineRead::TooLong);
    }

    #[test]
    fn test_cycle_line_format() {
        let record = CycleRecord {
            index: 3,
            target: Duration::from_millis(13_000),
            woke_at: Duration::from_micros(13_000_250),
            origin: Duration::from_secs(10),
            lateness: Duration::from_micros(250),
        };
        let line = cycle_line(&record, "127.0.0.1".parse().unwrap());
        assert_eq!(
            line,
            "[Cycle 03] RT-Task executed at 13.000 for 127.0.0.1 (elapsed 3.000 s, late 0.250 ms)\n"
        );
        assert_eq!(parse_cycle_index(&line), Some(3));
    }

    #[test]
    fn test_completion_round_trip() {
        assert_eq!(parse_completion(completion_notice(3).trim_end()), Some(3));
        assert_eq!(parse_completion("garbage"), None);
    }
}
