//! Deterministic offline report.
//!
//! When the completion backend is unavailable the run must still end in a
//! usable string report. `fallback_report` is a pure function of
//! `(reason, evidence)` so callers can also invoke it standalone after a
//! fatal orchestration error.

use crate::roles::{AgentOutput, Role};

/// Maximum number of evidence characters echoed into the report.
pub const DIGEST_LIMIT: usize = 160;

/// Build the deterministic fallback runbook.
///
/// Byte-identical for identical inputs. The embedded dict bullets stay
/// parseable by the downstream next-experiment parser.
pub fn fallback_report(reason: &str, evidence: &str) -> String {
    let digest: String = evidence.chars().take(DIGEST_LIMIT).collect();
    format!(
        "## next_experiments\n\
         - {{'uart_rate': 230400, 'buffer_size': 64}}\n\
         - {{'uart_rate': 115200, 'buffer_size': 128}}\n\n\
         ## instrumentation\n\
         - Ensure every uart.log line is timestamped and includes RUN_START/RUN_END markers.\n\
         - Add explicit ERROR codes to improve last_error_code extraction.\n\n\
         ## risks\n\
         - NIM unavailable ({reason}); using deterministic fallback.\n\n\
         ## demo_guidance\n\
         - Keep runner as the only hardware-touching module and iterate until pass.\n\
         - Context digest: {digest}"
    )
}

/// Fixed fan-out outputs used when no backend call is possible.
pub fn fallback_fanout() -> Vec<AgentOutput> {
    vec![
        AgentOutput::new(
            Role::Planner,
            "Fallback: run uart_rate=230400,buffer_size=64 then 115200/128.",
        ),
        AgentOutput::new(
            Role::Coder,
            "Fallback: ensure timestamped UART lines and explicit ERROR codes.",
        ),
        AgentOutput::new(
            Role::Critic,
            "Fallback: keep hardware access constrained to runner module.",
        ),
        AgentOutput::new(
            Role::Verifier,
            "Fallback: confidence=0.42; validator flags possible typo/malformed key risks in coder proposal.",
        ),
    ]
}
