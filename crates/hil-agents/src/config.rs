//! Immutable run configuration for the orchestrator.
//!
//! Read once at construction (either explicitly or via `from_env`) and
//! never re-read mid-run. There is no process-global state.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::roles::Role;

/// Fan-out topology for one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// planner → coder → critic → verifier, each on raw evidence.
    #[default]
    Sequential,
    /// Dependency-driven: planner/coder concurrent, then critic, then verifier.
    Parallel,
}

impl ExecutionMode {
    /// Parse a mode string; anything unrecognized normalizes to `Sequential`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "parallel" => Self::Parallel,
            _ => Self::Sequential,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

/// Default allowed UART baud options fed into the planner preamble.
pub const DEFAULT_BAUD_OPTIONS: &str =
    "9600,19200,38400,57600,74880,115200,230400,460800,921600,1000000,1500000,2000000";

/// Top-level orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// NIM chat-completions endpoint URL.
    pub chat_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Fan-out topology for this run.
    pub execution_mode: ExecutionMode,
    /// Coordinator → coder rework passes after the first merge (sequential only).
    pub rework_rounds: u32,
    /// Peer-to-peer refinement passes before merging.
    pub peer_message_rounds: u32,
    /// Per-call timeout applied to every backend request.
    pub timeout: Duration,
    /// Completion token cap (floored at 64).
    pub max_tokens: u32,
    /// Global minimum visible-running duration.
    pub min_visible: Duration,
    /// Per-role minimum visible-running durations.
    pub role_min_visible: BTreeMap<Role, Duration>,
    /// Administrative kill switch: when false no network calls are made.
    pub enabled: bool,
    /// Allowed UART baud options, interpolated into the planner preamble.
    pub baud_options: String,
}

impl OrchestratorConfig {
    /// Minimum visible duration for a role, falling back to the global value.
    pub fn min_visible_for(&self, role: Role) -> Duration {
        self.role_min_visible
            .get(&role)
            .copied()
            .unwrap_or(self.min_visible)
    }

    /// Build a configuration from `NIM_*` environment variables.
    ///
    /// Unset or unparseable values fall back to the defaults; this is the
    /// only place the environment is consulted.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let role_min_visible = [
            (Role::Planner, "NIM_MIN_RUNNING_PLANNER_S"),
            (Role::Coder, "NIM_MIN_RUNNING_CODER_S"),
            (Role::Critic, "NIM_MIN_RUNNING_CRITIC_S"),
            (Role::Verifier, "NIM_MIN_RUNNING_VERIFIER_S"),
            (Role::Summarizer, "NIM_MIN_RUNNING_SUMMARIZER_S"),
        ]
        .into_iter()
        .map(|(role, key)| {
            let fallback = defaults.min_visible_for(role);
            (role, env_duration(key, fallback))
        })
        .collect();

        Self {
            chat_url: env_or("NIM_CHAT_URL", &defaults.chat_url),
            model: env_or("NIM_MODEL", &defaults.model),
            execution_mode: ExecutionMode::parse(&env_or("NIM_EXECUTION_MODE", "sequential")),
            rework_rounds: env_u32("NIM_COORDINATOR_REWORK_ROUNDS", defaults.rework_rounds),
            peer_message_rounds: env_u32("NIM_PEER_MESSAGE_ROUNDS", defaults.peer_message_rounds),
            timeout: env_duration("NIM_TIMEOUT_S", defaults.timeout),
            max_tokens: env_u32("NIM_MAX_TOKENS", defaults.max_tokens).max(64),
            min_visible: env_duration("NIM_MIN_RUNNING_S", defaults.min_visible),
            role_min_visible,
            enabled: env_bool("NIM_ENABLED", true),
            baud_options: env_or("NIM_BAUD_OPTIONS", DEFAULT_BAUD_OPTIONS),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chat_url: "http://localhost:8000/v1/chat/completions".into(),
            model: "nvidia/nemotron-nano-9b-v2".into(),
            execution_mode: ExecutionMode::Sequential,
            rework_rounds: 0,
            peer_message_rounds: 1,
            timeout: Duration::from_secs_f64(3.0),
            max_tokens: 512,
            min_visible: Duration::from_millis(500),
            role_min_visible: BTreeMap::from([
                (Role::Planner, Duration::from_millis(500)),
                (Role::Coder, Duration::from_millis(450)),
                (Role::Critic, Duration::from_millis(700)),
                (Role::Verifier, Duration::from_millis(700)),
                (Role::Summarizer, Duration::from_millis(550)),
            ]),
            enabled: true,
            baud_options: DEFAULT_BAUD_OPTIONS.into(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"),
        Err(_) => default,
    }
}

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_mode_normalizes_to_sequential() {
        assert_eq!(ExecutionMode::parse("parallel"), ExecutionMode::Parallel);
        assert_eq!(ExecutionMode::parse(" PARALLEL "), ExecutionMode::Parallel);
        assert_eq!(ExecutionMode::parse("sequential"), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::parse("bogus"), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::parse(""), ExecutionMode::Sequential);
    }

    #[test]
    fn role_min_visible_falls_back_to_global() {
        let mut config = OrchestratorConfig::default();
        config.role_min_visible.remove(&Role::Critic);
        assert_eq!(config.min_visible_for(Role::Critic), config.min_visible);
        assert_eq!(
            config.min_visible_for(Role::Coder),
            Duration::from_millis(450)
        );
    }

    #[test]
    fn default_timings_match_role_budget() {
        let config = OrchestratorConfig::default();
        assert_eq!(
            config.min_visible_for(Role::Verifier),
            Duration::from_millis(700)
        );
        assert_eq!(
            config.min_visible_for(Role::Summarizer),
            Duration::from_millis(550)
        );
    }
}
