//! Async fan-out/fan-in agent orchestrator over a single NIM endpoint.
//!
//! Five fixed reviewer roles (planner, coder, critic, verifier, plus the
//! summarizer merge role) each make one chat completion call per round;
//! the orchestrator schedules them per the configured topology, relays
//! peer-call directives between their outputs, merges everything into one
//! actionable runbook, and degrades to a deterministic fallback report
//! when the backend is unreachable.

pub mod backend;
pub mod config;
pub mod fallback;
pub mod orchestrator;
pub mod peer;
pub mod prompts;
pub mod proposals;
pub mod roles;
pub mod status;

pub use backend::{check_endpoint, probe_backend, Backend, BackendError, CompletionBackend, NimClient};
pub use config::{ExecutionMode, OrchestratorConfig};
pub use fallback::fallback_report;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use proposals::{parse_next_experiments, ExperimentProposal, ProposalValue};
pub use roles::{AgentOutput, Role, RoundState, FANOUT_ROLES};
pub use status::{AgentState, StatusCallback};
