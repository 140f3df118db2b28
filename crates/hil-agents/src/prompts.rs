//! System prompt preambles for each agent role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content
//! changes, so a given agent response can be traced back to the prompt
//! that produced it.

use crate::roles::Role;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Planner preamble with the allowed baud options interpolated.
///
/// The planner must only propose parameter values the runner can actually
/// apply, so the allowed option list travels inside the preamble.
pub fn planner_preamble(baud_options: &str) -> String {
    format!(
        "Allowed UART baud options: {baud_options}. \
         You are planner agent. Propose next 3-5 UART HIL experiments. \
         Respect: only runner can touch hardware. Cite uart.log and analysis.json evidence. \
         If case=uart_demo, propose guess_baud values only from allowed options. \
         If case=framing_hunt use guess_frame. If case=parity_hunt use guess_parity. \
         If case=signature_check use guess_magic. \
         Emit proposals as one-line dict bullets, e.g. - {{'guess_baud': 230400}}"
    )
}

pub const CODER_PREAMBLE: &str = "You are coder agent. Propose minimal instrumentation and \
     robustness patch ideas only. No hardware access outside runner.";

pub const CRITIC_PREAMBLE: &str = "You are critic agent. Review feasibility and risk. \
     Enforce runner-only hardware access and UART-only truth layer assumptions.";

pub const VERIFIER_PREAMBLE: &str = "You are verifier agent (validator). Judge evidence quality \
     and confidence from UART-only data, and audit coder output for correctness risks: typos, \
     malformed parameter keys, invalid value ranges, or contradictory patch instructions. \
     Return concise sections: confidence[0,1], coder_validation, blockers, acceptance_criteria.";

pub const SUMMARIZER_PREAMBLE: &str = "You are summarizer agent. Merge planner/coder/critic/\
     verifier outputs into one actionable runbook. Sections: next_experiments, instrumentation, \
     risks, verification, demo_guidance.";

/// The system prompt for a role.
pub fn preamble(role: Role, baud_options: &str) -> String {
    match role {
        Role::Planner => planner_preamble(baud_options),
        Role::Coder => CODER_PREAMBLE.into(),
        Role::Critic => CRITIC_PREAMBLE.into(),
        Role::Verifier => VERIFIER_PREAMBLE.into(),
        Role::Summarizer => SUMMARIZER_PREAMBLE.into(),
    }
}
