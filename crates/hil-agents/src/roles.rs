//! The closed role set and per-round output state.
//!
//! Roles are static configuration: four fan-out reviewers plus the
//! summarizer that merges their outputs into the final runbook.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A fixed agent identity with its own system prompt and minimum
/// visible-running duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Proposes the next HIL experiments from raw evidence.
    Planner,
    /// Proposes minimal instrumentation and robustness patches.
    Coder,
    /// Reviews feasibility and risk of the coder/planner proposals.
    Critic,
    /// Scores evidence quality and audits the coder output.
    Verifier,
    /// Merge role: produces the final actionable runbook.
    Summarizer,
}

/// Fan-out roles in their fixed sequential invocation order.
pub const FANOUT_ROLES: [Role; 4] = [Role::Planner, Role::Coder, Role::Critic, Role::Verifier];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Coder => "coder",
            Self::Critic => "critic",
            Self::Verifier => "verifier",
            Self::Summarizer => "summarizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planner" => Ok(Self::Planner),
            "coder" => Ok(Self::Coder),
            "critic" => Ok(Self::Critic),
            "verifier" => Ok(Self::Verifier),
            "summarizer" => Ok(Self::Summarizer),
            _ => Err(UnknownRole),
        }
    }
}

/// Error for a role name outside the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownRole;

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown agent role")
    }
}

impl std::error::Error for UnknownRole {}

/// One agent invocation's result. Immutable after creation; refreshing a
/// role replaces the whole entry rather than patching it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub role: Role,
    pub text: String,
}

impl AgentOutput {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// The current fan-out outputs plus the refinement round index.
#[derive(Debug, Clone, Default)]
pub struct RoundState {
    pub outputs: Vec<AgentOutput>,
    pub round: u32,
}

impl RoundState {
    pub fn new(outputs: Vec<AgentOutput>) -> Self {
        Self { outputs, round: 0 }
    }

    /// Replace the entry for `output.role`, keeping the fan-out order.
    pub fn replace(&mut self, output: AgentOutput) {
        if let Some(slot) = self.outputs.iter_mut().find(|o| o.role == output.role) {
            *slot = output;
        } else {
            self.outputs.push(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in FANOUT_ROLES.iter().chain([Role::Summarizer].iter()) {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
        assert_eq!("PLANNER".parse::<Role>().unwrap(), Role::Planner);
        assert!("debugger".parse::<Role>().is_err());
    }

    #[test]
    fn fanout_order_is_fixed_and_excludes_summarizer() {
        assert_eq!(
            FANOUT_ROLES,
            [Role::Planner, Role::Coder, Role::Critic, Role::Verifier]
        );
        assert!(!FANOUT_ROLES.contains(&Role::Summarizer));
    }

    #[test]
    fn round_state_replaces_whole_entry_in_place() {
        let mut state = RoundState::new(vec![
            AgentOutput::new(Role::Planner, "v1"),
            AgentOutput::new(Role::Coder, "v1"),
        ]);
        state.replace(AgentOutput::new(Role::Planner, "v2"));
        assert_eq!(state.outputs.len(), 2);
        assert_eq!(state.outputs[0], AgentOutput::new(Role::Planner, "v2"));
        assert_eq!(state.outputs[1], AgentOutput::new(Role::Coder, "v1"));
    }
}
