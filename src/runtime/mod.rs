//! Runtime adapters: the tokio accept loop and the blocking client.

pub mod client;
#[cfg(feature = "tokio-runtime")]
pub mod server;

pub use client::{run_session, ClientOutcome, ClientTranscript};
#[cfg(feature = "tokio-runtime")]
pub use server::{run_server, serve, shutdown_signal, ServeReport, SessionRegistry};
