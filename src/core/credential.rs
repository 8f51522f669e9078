//! Single-round identity challenge.

use std::io::{Read, Write};

use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::protocol::{read_bounded_line, LineRead, AUTH_FAILURE, AUTH_PROMPT, AUTH_SUCCESS};

/// Why a challenge did not accept the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialFailure {
    /// The peer closed the stream without answering.
    PeerClosed,
    /// The answer exceeded the identity length limit.
    TooLong,
    /// The answer did not match the authorized identity.
    Mismatch {
        /// What the peer sent (lossy UTF-8), kept for audit logging.
        claimed: String,
    },
}

/// Result of one challenge round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialVerdict {
    /// The peer presented the authorized identity.
    Accepted {
        /// The accepted identity.
        identity: String,
    },
    /// The peer was refused.
    Rejected(CredentialFailure),
}

impl CredentialVerdict {
    /// Whether the peer was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The identity the peer claimed, when one was read.
    #[must_use]
    pub fn claimed_identity(&self) -> Option<&str> {
        match self {
            Self::Accepted { identity } => Some(identity),
            Self::Rejected(CredentialFailure::Mismatch { claimed }) => Some(claimed),
            Self::Rejected(_) => None,
        }
    }
}

/// Prompts for an identity line and compares it with the one authorized identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialGate {
    authorized_identity: String,
    max_identity_len: usize,
}

impl CredentialGate {
    /// Build a gate accepting exactly `authorized_identity`.
    pub fn new(authorized_identity: impl Into<String>, max_identity_len: usize) -> Self {
        Self {
            authorized_identity: authorized_identity.into(),
            max_identity_len,
        }
    }

    /// Maximum accepted identity length in bytes.
    #[must_use]
    pub const fn max_identity_len(&self) -> usize {
        self.max_identity_len
    }

    /// Run the challenge over `stream`.
    ///
    /// Writes the prompt, reads one bounded line, and answers with the
    /// success or failure notice. The comparison is byte-for-byte after
    /// trailing `\r`/`\n` are stripped. There is no retry.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TransportWrite`] if the prompt cannot be sent and
    /// [`GatewayError::TransportRead`] if the answer cannot be read; the
    /// failure notice is still attempted first. A peer that closes,
    /// overflows, or mismatches is a rejection, not an error.
    pub fn challenge<S: Read + Write + ?Sized>(
        &self,
        stream: &mut S,
    ) -> Result<CredentialVerdict, GatewayError> {
        stream
            .write_all(AUTH_PROMPT.as_bytes())
            .and_then(|()| stream.flush())
            .map_err(GatewayError::TransportWrite)?;

        let verdict = match read_bounded_line(stream, self.max_identity_len) {
            Ok(LineRead::Line(bytes)) => {
                if bytes == self.authorized_identity.as_bytes() {
                    CredentialVerdict::Accepted {
                        identity: self.authorized_identity.clone(),
                    }
                } else {
                    CredentialVerdict::Rejected(CredentialFailure::Mismatch {
                        claimed: String::from_utf8_lossy(&bytes).into_owned(),
                    })
                }
            }
            Ok(LineRead::Closed) => CredentialVerdict::Rejected(CredentialFailure::PeerClosed),
            Ok(LineRead::TooLong) => CredentialVerdict::Rejected(CredentialFailure::TooLong),
            Err(e) => {
                warn!(error = %e, "Failed to read identity line");
                if let Err(notice_err) = stream
                    .write_all(AUTH_FAILURE.as_bytes())
                    .and_then(|()| stream.flush())
                {
                    debug!(error = %notice_err, "Failure notice not delivered");
                }
                return Err(GatewayError::TransportRead(e));
            }
        };

        let notice = match &verdict {
            CredentialVerdict::Accepted { identity } => {
                info!(identity = %identity, "Identity accepted");
                AUTH_SUCCESS
            }
            CredentialVerdict::Rejected(failure) => {
                warn!(failure = ?failure, "Identity rejected");
                AUTH_FAILURE
            }
        };

        // A peer that already hung up cannot read the notice; the verdict stands.
        if let Err(e) = stream.write_all(notice.as_bytes()).and_then(|()| stream.flush()) {
            warn!(error = %e, "Failed to deliver authentication notice");
        }

        Ok(verdict)
    }
}
