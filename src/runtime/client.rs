//! Blocking test client for the gateway protocol.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::protocol::{
    parse_completion, parse_cycle_index, AUTH_FAILURE, AUTH_PROMPT, AUTH_SUCCESS, ORIGIN_REJECTED,
};

/// How a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientOutcome {
    /// The server refused the client's address before prompting.
    OriginRejected,
    /// The identity was refused.
    AuthenticationFailed,
    /// The server reported completion after `cycles` cycles.
    Completed {
        /// Count from the completion line.
        cycles: u32,
    },
    /// The stream ended without a completion line.
    Truncated {
        /// Cycle lines received before the stream ended.
        cycles_seen: u32,
    },
}

/// Every line the server sent, plus the interpreted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTranscript {
    /// Server lines without line endings. The prompt is recorded as its own line.
    pub lines: Vec<String>,
    /// Interpreted end of the session.
    pub outcome: ClientOutcome,
}

impl ClientTranscript {
    /// Indices of the cycle lines received, in arrival order.
    #[must_use]
    pub fn cycle_indices(&self) -> Vec<u32> {
        self.lines
            .iter()
            .filter_map(|line| parse_cycle_index(line))
            .collect()
    }
}

/// Connect to `addr`, answer the prompt with `identity`, and follow the
/// session to its end. Every server line is passed to `on_line` as it arrives.
///
/// # Errors
///
/// Returns connection and I/O errors. A server that closes early is not an
/// error; it yields a `Truncated` outcome.
pub fn run_session<F>(addr: SocketAddr, identity: &str, mut on_line: F) -> io::Result<ClientTranscript>
where
    F: FnMut(&str),
{
    let mut stream = TcpStream::connect(addr)?;
    info!(server = %addr, "Connected");
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut lines = Vec::new();

    let Some(greeting) = read_greeting(&mut reader)? else {
        return Ok(ClientTranscript {
            lines,
            outcome: ClientOutcome::Truncated { cycles_seen: 0 },
        });
    };
    on_line(&greeting);
    lines.push(greeting.clone());

    if greeting == ORIGIN_REJECTED.trim_end() {
        return Ok(ClientTranscript {
            lines,
            outcome: ClientOutcome::OriginRejected,
        });
    }
    if greeting != AUTH_PROMPT.trim_end() {
        debug!(greeting = %greeting, "Unexpected greeting");
    }

    stream.write_all(identity.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut cycles_seen = 0u32;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim_end_matches(['\r', '\n']).to_string();
        on_line(&text);

        if text == AUTH_FAILURE.trim_end() {
            lines.push(text);
            return Ok(ClientTranscript {
                lines,
                outcome: ClientOutcome::AuthenticationFailed,
            });
        }
        if let Some(cycles) = parse_completion(&text) {
            lines.push(text);
            return Ok(ClientTranscript {
                lines,
                outcome: ClientOutcome::Completed { cycles },
            });
        }
        if parse_cycle_index(&text).is_some() {
            cycles_seen += 1;
        } else if text != AUTH_SUCCESS.trim_end() {
            debug!(line = %text, "Informational line");
        }
        lines.push(text);
    }

    Ok(ClientTranscript {
        lines,
        outcome: ClientOutcome::Truncated { cycles_seen },
    })
}

/// Read up to the prompt (which has no newline) or the first full line.
fn read_greeting<R: Read>(reader: &mut R) -> io::Result<Option<String>> {
    let prompt_tail = AUTH_PROMPT.as_bytes();
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                buf.push(byte[0]);
                if buf.ends_with(prompt_tail) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    if buf.is_empty() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&buf);
    Ok(Some(text.trim_end().to_string()))
}
