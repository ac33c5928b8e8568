#![forbid(unsafe_code)]

//! JSON-RPC 2.0 over stdio bridge to a child Agent Client Protocol agent.
//!
//! [`orchestrator::supervisor::AgentSupervisor`] is the entry point: it
//! spawns the agent, negotiates a session, sends prompts and collects the
//! streamed reply text, and stops the process with a grace period.

pub mod acp;
pub mod config;
pub mod errors;
pub mod handler;
pub mod mode;
pub mod models;
pub mod orchestrator;
pub mod policy;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};
