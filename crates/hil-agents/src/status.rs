//! Status-change events for external observers (dashboard, CLI trace).
//!
//! Events are fire-and-forget: observers never influence scheduling, and a
//! missing or panicking observer must not abort agent execution.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::roles::Role;

/// Agent lifecycle states as seen by observers.
///
/// Every invoked role emits `Running` first, then exactly one terminal
/// state per round it participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Running,
    Done,
    Error,
    Disabled,
    Fallback,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Disabled => "disabled",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Synchronous observer callback: `(role, state, message)`.
pub type StatusCallback = Arc<dyn Fn(Role, AgentState, &str) + Send + Sync>;

/// Forward one status transition to the observer, if any.
///
/// A panicking observer is logged and swallowed so it cannot take the
/// orchestration down with it.
pub(crate) fn emit(callback: Option<&StatusCallback>, role: Role, state: AgentState, message: &str) {
    let Some(cb) = callback else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| cb(role, state, message))).is_err() {
        warn!(role = %role, state = %state, "status observer panicked; continuing");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn emit_without_observer_is_noop() {
        emit(None, Role::Planner, AgentState::Running, "msg");
    }

    #[test]
    fn panicking_observer_is_contained() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let cb: StatusCallback = Arc::new(move |_, _, _| {
            seen_cb.fetch_add(1, Ordering::SeqCst);
            panic!("observer bug");
        });
        emit(Some(&cb), Role::Coder, AgentState::Done, "msg");
        emit(Some(&cb), Role::Critic, AgentState::Done, "msg");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn terminal_states() {
        assert!(!AgentState::Running.is_terminal());
        for state in [
            AgentState::Done,
            AgentState::Error,
            AgentState::Disabled,
            AgentState::Fallback,
        ] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn snake_case_display() {
        assert_eq!(AgentState::Fallback.to_string(), "fallback");
        assert_eq!(AgentState::Running.to_string(), "running");
    }
}
