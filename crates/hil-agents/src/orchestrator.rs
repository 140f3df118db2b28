//! Orchestration core: dependency-aware fan-out, peer-message relay,
//! merge plus coordinator rework, and the deterministic fallback path.
//!
//! One run turns a single evidence string into a final runbook string.
//! The central invariant is per-role failure isolation: an individual
//! agent call failing (or timing out) degrades to an "unavailable"
//! placeholder output and never aborts sibling calls or the run. Only the
//! merge and rework steps, which have no per-role owner, propagate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, CompletionBackend};
use crate::config::{ExecutionMode, OrchestratorConfig};
use crate::fallback::{fallback_fanout, fallback_report};
use crate::peer;
use crate::prompts;
use crate::roles::{AgentOutput, Role, RoundState, FANOUT_ROLES};
use crate::status::{emit, AgentState, StatusCallback};

/// Fatal orchestration failure: a step with no natural per-role owner.
///
/// Callers are expected to catch this and hand the message to
/// `fallback_report`, so the user always gets a string report.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("merge step failed: {0}")]
    Merge(#[source] BackendError),
    #[error("coder rework failed: {0}")]
    Rework(#[source] BackendError),
}

/// Async fan-out/fan-in orchestrator over a single NIM endpoint.
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    backend: Backend,
    status: Option<StatusCallback>,
    last_fanout: Mutex<Vec<AgentOutput>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        backend: Backend,
        status: Option<StatusCallback>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            status,
            last_fanout: Mutex::new(Vec::new()),
        }
    }

    /// The fan-out outputs from the most recent run (post-relay), for
    /// callers that render per-role fragments.
    pub fn last_fanout(&self) -> Vec<AgentOutput> {
        self.last_fanout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run one full orchestration over the supplied evidence bundle.
    ///
    /// Returns the final report text. Per-role backend failures never
    /// surface here; only merge/rework failures do.
    pub async fn run(&self, evidence: &str) -> Result<String, OrchestratorError> {
        if !self.config.enabled {
            return Ok(self.run_disabled());
        }
        let backend = match &self.backend {
            Backend::Ready(backend) => Arc::clone(backend),
            Backend::Offline { reason } => return Ok(self.run_offline(reason, evidence).await),
        };

        info!(mode = %self.config.execution_mode, "starting agent fan-out");
        let state = self.run_fanout(&backend, evidence).await;
        let state = self.relay(&backend, state, evidence).await;
        *self
            .last_fanout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state.outputs.clone();

        self.merge_and_rework(&backend, &state, evidence).await
    }

    /// Initial fan-out across the reviewer roles. Never fails.
    async fn run_fanout(&self, backend: &Arc<dyn CompletionBackend>, evidence: &str) -> RoundState {
        let outputs = match self.config.execution_mode {
            ExecutionMode::Sequential => self.fanout_sequential(backend, evidence).await,
            ExecutionMode::Parallel => self.fanout_parallel(backend, evidence).await,
        };
        RoundState::new(outputs)
    }

    /// Fixed-order fan-out; every role sees only the raw evidence.
    async fn fanout_sequential(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        evidence: &str,
    ) -> Vec<AgentOutput> {
        let mut outputs = Vec::with_capacity(FANOUT_ROLES.len());
        for role in FANOUT_ROLES {
            outputs.push(
                self.invoke_isolated(backend, role, evidence.to_string())
                    .await,
            );
        }
        outputs
    }

    /// Dependency-driven fan-out.
    ///
    /// planner and coder start together from raw evidence; critic waits on
    /// both and reviews the concrete coder proposal against the planner's
    /// experiment list; verifier waits on all three so it can audit the
    /// full chain before scoring confidence.
    async fn fanout_parallel(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        evidence: &str,
    ) -> Vec<AgentOutput> {
        let planner_task = self.spawn_call(backend, Role::Planner, evidence.to_string());
        let coder_task = self.spawn_call(backend, Role::Coder, evidence.to_string());

        let planner_out = self.absorb(Role::Planner, planner_task.await);
        let coder_out = self.absorb(Role::Coder, coder_task.await);

        let critic_input = format!(
            "{evidence}\n\n[coder_proposal]\n{}\n\n[planner_experiments]\n{}",
            coder_out.text, planner_out.text
        );
        let critic_out = self.invoke_isolated(backend, Role::Critic, critic_input).await;

        let verifier_input = format!(
            "{evidence}\n\n[planner]\n{}\n\n[coder]\n{}\n\n[critic]\n{}",
            planner_out.text, coder_out.text, critic_out.text
        );
        let verifier_out = self
            .invoke_isolated(backend, Role::Verifier, verifier_input)
            .await;

        vec![planner_out, coder_out, critic_out, verifier_out]
    }

    /// Peer-to-peer refinement rounds before summarization.
    ///
    /// Stops early at the fixed point: no output carries a directive.
    async fn relay(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        mut state: RoundState,
        evidence: &str,
    ) -> RoundState {
        for round_idx in 0..self.config.peer_message_rounds {
            let inbox = peer::build_inbox(&peer::collect_peer_requests(&state.outputs));
            if inbox.is_empty() {
                break;
            }
            debug!(round = round_idx + 1, addressed = inbox.len(), "peer relay round");

            let current = state.outputs.clone();
            for item in &current {
                let Some(msgs) = inbox.get(&item.role).filter(|m| !m.is_empty()) else {
                    // Empty inbox: the entry stands untouched, no wasted call.
                    continue;
                };
                for msg in msgs.iter().take(3) {
                    emit(
                        self.status.as_ref(),
                        item.role,
                        AgentState::Running,
                        &format!("Peer call {msg} -> {}", item.role),
                    );
                }
                let bullets: Vec<String> = msgs.iter().map(|m| format!("- {m}")).collect();
                let peer_prompt = format!(
                    "Peer agents requested follow-up specialization. \
                     Address these requests for role={role} and refine your output.\n\n\
                     [peer_requests_round_{round}]\n{bullets}\n\n\
                     [current_output]\n{current}\n\n\
                     [original_evidence]\n{evidence}",
                    role = item.role,
                    round = round_idx + 1,
                    bullets = bullets.join("\n"),
                    current = item.text,
                );
                let refreshed = match self.call(backend, item.role, peer_prompt).await {
                    Ok(updated) => updated,
                    Err(err) => {
                        emit(
                            self.status.as_ref(),
                            item.role,
                            AgentState::Error,
                            &err.to_string(),
                        );
                        AgentOutput::new(
                            item.role,
                            format!("{} unavailable after peer request: {err}", item.role),
                        )
                    }
                };
                state.replace(refreshed);
            }
            state.round = round_idx + 1;
        }
        state
    }

    /// Merge all outputs into the final report, then optionally run the
    /// coordinator → coder rework loop (sequential mode only).
    ///
    /// The loop always terminates after the configured round count; there
    /// is deliberately no convergence check, which bounds worst-case
    /// latency deterministically.
    async fn merge_and_rework(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        state: &RoundState,
        evidence: &str,
    ) -> Result<String, OrchestratorError> {
        let mut merge_input = merge_input(&state.outputs);
        let mut summary = self
            .call(backend, Role::Summarizer, merge_input.clone())
            .await
            .map_err(OrchestratorError::Merge)?;

        if self.config.execution_mode == ExecutionMode::Sequential {
            for round in 1..=self.config.rework_rounds {
                let feedback_prompt = format!(
                    "Coordinator requests one focused refinement pass. \
                     Revise instrumentation/fix guidance only. Keep it minimal and actionable.\n\n\
                     [current_summary_round_{round}]\n{}\n\n\
                     [original_evidence]\n{evidence}",
                    summary.text
                );
                let rework = self
                    .call(backend, Role::Coder, feedback_prompt)
                    .await
                    .map_err(OrchestratorError::Rework)?;
                merge_input.push_str(&format!("\n\n[coder_rework_round_{round}]\n{}", rework.text));
                summary = self
                    .call(backend, Role::Summarizer, merge_input.clone())
                    .await
                    .map_err(OrchestratorError::Merge)?;
            }
        }

        Ok(summary.text)
    }

    /// Administrative kill switch: no network calls at all.
    fn run_disabled(&self) -> String {
        for role in FANOUT_ROLES.into_iter().chain([Role::Summarizer]) {
            emit(
                self.status.as_ref(),
                role,
                AgentState::Disabled,
                "NIM orchestration disabled.",
            );
        }
        "NIM orchestration disabled via config.".to_string()
    }

    /// Scripted offline path: staged progress events so observers still
    /// see the roles "work", then the deterministic fallback report.
    async fn run_offline(&self, reason: &str, evidence: &str) -> String {
        warn!(reason, "completion backend offline; using deterministic fallback");
        let staged = [
            (Role::Planner, "Planning next experiments from UART evidence.", 250),
            (Role::Coder, "Drafting minimal instrumentation improvements.", 200),
            (Role::Critic, "Reviewing feasibility and runner-only constraints.", 350),
            (Role::Verifier, "Scoring evidence quality and confidence.", 200),
        ];
        for (role, message, delay_ms) in staged {
            emit(self.status.as_ref(), role, AgentState::Running, message);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let outputs = fallback_fanout();
        for item in &outputs {
            emit(self.status.as_ref(), item.role, AgentState::Fallback, &item.text);
        }
        *self
            .last_fanout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = outputs;

        emit(
            self.status.as_ref(),
            Role::Summarizer,
            AgentState::Running,
            "Merging planner/coder/critic/verifier updates.",
        );
        tokio::time::sleep(Duration::from_millis(400)).await;
        emit(
            self.status.as_ref(),
            Role::Summarizer,
            AgentState::Fallback,
            "Using deterministic fallback summary.",
        );
        fallback_report(reason, evidence)
    }

    /// One agent call with the failure absorbed into a placeholder output.
    async fn invoke_isolated(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        role: Role,
        user_prompt: String,
    ) -> AgentOutput {
        match self.call(backend, role, user_prompt).await {
            Ok(output) => output,
            Err(err) => self.role_unavailable(role, &err.to_string()),
        }
    }

    /// One agent call, errors propagated to the caller.
    async fn call(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        role: Role,
        user_prompt: String,
    ) -> Result<AgentOutput, BackendError> {
        call_agent(
            Arc::clone(backend),
            Arc::clone(&self.config),
            self.status.clone(),
            role,
            user_prompt,
        )
        .await
    }

    /// Spawn an independent role task for the parallel topology.
    fn spawn_call(
        &self,
        backend: &Arc<dyn CompletionBackend>,
        role: Role,
        user_prompt: String,
    ) -> JoinHandle<Result<AgentOutput, BackendError>> {
        tokio::spawn(call_agent(
            Arc::clone(backend),
            Arc::clone(&self.config),
            self.status.clone(),
            role,
            user_prompt,
        ))
    }

    /// Convert a joined task result into an output, absorbing failures.
    fn absorb(
        &self,
        role: Role,
        joined: Result<Result<AgentOutput, BackendError>, tokio::task::JoinError>,
    ) -> AgentOutput {
        match joined {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => self.role_unavailable(role, &err.to_string()),
            Err(join_err) => self.role_unavailable(role, &join_err.to_string()),
        }
    }

    fn role_unavailable(&self, role: Role, err: &str) -> AgentOutput {
        emit(self.status.as_ref(), role, AgentState::Error, err);
        AgentOutput::new(role, format!("{role} unavailable: {err}"))
    }
}

/// Concatenate all role outputs into the merge input.
fn merge_input(outputs: &[AgentOutput]) -> String {
    outputs
        .iter()
        .map(|o| format!("[{}]\n{}", o.role, o.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Agent Call Unit: one request/response cycle for a single role.
///
/// Emits `running` before the call and `done` after, and stretches the
/// visible running time to the role's configured minimum so observers can
/// actually see concurrent progress. The stretch is presentation-only; it
/// never alters the returned text.
async fn call_agent(
    backend: Arc<dyn CompletionBackend>,
    config: Arc<OrchestratorConfig>,
    status: Option<StatusCallback>,
    role: Role,
    user_prompt: String,
) -> Result<AgentOutput, BackendError> {
    emit(
        status.as_ref(),
        role,
        AgentState::Running,
        "Working on current evidence bundle.",
    );
    let started = Instant::now();

    let system_prompt = prompts::preamble(role, &config.baud_options);
    let text = backend.complete(&system_prompt, &user_prompt).await?;
    let text = if text.is_empty() {
        format!("{role} produced empty output")
    } else {
        text
    };

    let min_visible = config.min_visible_for(role);
    let elapsed = started.elapsed();
    if elapsed < min_visible {
        tokio::time::sleep(min_visible - elapsed).await;
    }

    emit(status.as_ref(), role, AgentState::Done, &text);
    Ok(AgentOutput::new(role, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_input_joins_labeled_sections() {
        let outputs = vec![
            AgentOutput::new(Role::Planner, "plan"),
            AgentOutput::new(Role::Coder, "patch"),
        ];
        assert_eq!(merge_input(&outputs), "[planner]\nplan\n\n[coder]\npatch");
    }
}
