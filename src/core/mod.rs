//! Authorization gates, periodic scheduling, and session execution.

pub mod authorization;
pub mod credential;
pub mod error;
pub mod handler;
pub mod origin;
pub mod priority;
pub mod protocol;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod shutdown;

pub use authorization::{AuthorizationPipeline, AuthorizationReason, AuthorizationResult};
pub use credential::{CredentialFailure, CredentialGate, CredentialVerdict};
pub use error::{AppResult, GatewayError};
pub use handler::{Gateway, SessionSummary};
pub use origin::OriginGate;
pub use priority::{
    lock_process_memory, unlock_process_memory, Elevation, FifoElevator, FixedElevator,
    PriorityElevator,
};
pub use runner::{demonstration_workload, RunOutcome, RunReport, SessionRunner};
pub use scheduler::{CancelCause, CycleRecord, PeriodicScheduler, ScheduleState, SchedulerPhase, Tick};
pub use session::{AuthState, AuthorizedSession, Connection, Session};
pub use shutdown::ShutdownSignal;
