//! # rt_gatekeeper
//!
//! A network-exposed gateway that grants authorized remote clients a bounded
//! run of a periodic real-time task.
//!
//! Each connection passes two gates before anything runs:
//!
//! - **Origin gate**: the peer address must be on the configured allow-list,
//!   checked before any byte is read from the peer.
//! - **Credential gate**: the peer answers a prompt with one line, which must
//!   equal the authorized identity byte for byte.
//!
//! An authorized session gets its own OS thread. That thread asks for
//! `SCHED_FIFO` priority (falling back to normal scheduling when the process
//! lacks the privilege), then wakes at absolute deadlines `origin + k * period`
//! and reports every cycle to the peer until the cycle bound, a shutdown
//! request, or a dead peer ends the run.
//!
//! ## Running a gateway
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rt_gatekeeper::config::GatewayConfig;
//! use rt_gatekeeper::core::{Gateway, ShutdownSignal};
//! use rt_gatekeeper::runtime::{run_server, shutdown_signal};
//!
//! let config = GatewayConfig::default().with_cycle_bound(20);
//! let gateway = Arc::new(Gateway::new(config, ShutdownSignal::new())?);
//! let report = run_server(gateway, shutdown_signal()).await?;
//! ```
//!
//! ## Driving a session directly
//!
//! The pipeline and runner work over any [`core::Connection`], which is how
//! the tests exercise them with an in-memory transport:
//!
//! ```rust,ignore
//! use rt_gatekeeper::core::{Gateway, ShutdownSignal, FixedElevator, Elevation};
//! use rt_gatekeeper::infra::MemoryConnection;
//!
//! let gateway = Gateway::new(config, ShutdownSignal::new())?
//!     .with_elevator(FixedElevator(Elevation::Elevated));
//! let summary = gateway.handle(MemoryConnection::new("admin\n"), "127.0.0.1".parse()?);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Authorization gates, periodic scheduling, and session execution.
pub mod core;
/// Gateway configuration.
pub mod config;
/// Transport adapters: TCP, console, and in-memory connections.
pub mod infra;
/// Runtime adapters: async accept loop and client.
pub mod runtime;
/// Clocks and tracing setup.
pub mod util;
