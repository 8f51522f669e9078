//! Configuration models for the gateway and its real-time sessions.

pub mod gateway;

pub use gateway::GatewayConfig;
