//! In-memory connection for development and testing.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::Connection;

#[derive(Debug, Default)]
struct MemoryState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    writes: usize,
    fail_writes_from: Option<usize>,
    read_error: Option<io::ErrorKind>,
    closed: bool,
}

/// Connection backed by a scripted input buffer and a captured output buffer.
///
/// Clones share state, so a test keeps one handle to inspect while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnection {
    /// Create a connection whose peer will send `input`, then end the stream.
    #[must_use]
    pub fn new(input: impl AsRef<[u8]>) -> Self {
        let conn = Self::default();
        conn.state.lock().input.extend(input.as_ref());
        conn
    }

    /// Fail every `write` call from the given 1-based ordinal on with
    /// `BrokenPipe`, as a disconnected peer would.
    pub fn fail_writes_from(&self, ordinal: usize) {
        self.state.lock().fail_writes_from = Some(ordinal);
    }

    /// Fail every read with the given error kind.
    pub fn fail_reads_with(&self, kind: io::ErrorKind) {
        self.state.lock().read_error = Some(kind);
    }

    /// Number of `write` calls made so far, failed ones included.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Everything successfully written, as lossy UTF-8.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().output).into_owned()
    }

    /// Written output split into lines (the prompt, lacking a newline, is
    /// joined with whatever follows it).
    #[must_use]
    pub fn output_lines(&self) -> Vec<String> {
        self.output().lines().map(str::to_string).collect()
    }

    /// Whether the owning session closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Read for MemoryConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some(kind) = state.read_error {
            return Err(io::Error::new(kind, "injected read failure"));
        }
        if state.closed {
            return Ok(0);
        }
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.writes += 1;
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        if state.fail_writes_from.is_some_and(|from| state.writes >= from) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"));
        }
        state.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_sees_session_writes() {
        let peer = MemoryConnection::new(b"admin\n");
        let mut owned = peer.clone();

        let mut buf = [0u8; 16];
        let n = owned.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"admin\n");
        assert_eq!(owned.read(&mut buf).unwrap(), 0);

        owned.write_all(b"hello\n").unwrap();
        assert_eq!(peer.output(), "hello\n");

        owned.close().unwrap();
        assert!(peer.is_closed());
    }

    #[test]
    fn test_write_failure_injection() {
        let peer = MemoryConnection::default();
        let mut owned = peer.clone();
        peer.fail_writes_from(2);

        assert!(owned.write_all(b"one").is_ok());
        let err = owned.write_all(b"two").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(peer.output(), "one");
        assert_eq!(peer.write_count(), 2);
    }
}
