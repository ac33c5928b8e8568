//! Agent process orchestration.
//!
//! Covers the supervisor state machine and the child process helpers it
//! uses for stderr draining and graceful termination.

pub mod child_monitor;
pub mod supervisor;

pub use supervisor::{AgentSupervisor, ConnectionState, PromptOutcome, SupervisorSettings};
