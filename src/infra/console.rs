//! Console connection: reads from stdin, writes to stdout.
//!
//! Lets the local demonstration mode run a session on the terminal with the
//! same pipeline and runner the server uses.

use std::io::{self, Read, Stdin, Stdout, Write};

use crate::core::Connection;

/// The process's standard input and output as one session transport.
#[derive(Debug)]
pub struct ConsoleConnection {
    stdin: Stdin,
    stdout: Stdout,
}

impl ConsoleConnection {
    /// Attach to the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl Default for ConsoleConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for ConsoleConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.lock().read(buf)
    }
}

impl Write for ConsoleConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.lock().flush()
    }
}

impl Connection for ConsoleConnection {}
