//! Peer-call directive parsing.
//!
//! Agents address one another by embedding `@role: message` or
//! `CALL role: message` lines in their output text. This module is the
//! narrow parser boundary that turns those lines into typed requests;
//! only the four fan-out roles are addressable.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::roles::{AgentOutput, Role};

static PEER_DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:@|CALL\s+)(planner|coder|critic|verifier)\s*:\s*(.+)$")
        .expect("PEER_DIRECTIVE_RE regex should compile")
});

/// One cross-role request extracted from an agent's output.
///
/// Ephemeral: exists only within a single peer-message round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRequest {
    pub from: Role,
    pub to: Role,
    pub message: String,
}

/// Scan every output's text for peer-call directives.
pub fn collect_peer_requests(outputs: &[AgentOutput]) -> Vec<PeerRequest> {
    let mut requests = Vec::new();
    for item in outputs {
        for raw in item.text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let Some(caps) = PEER_DIRECTIVE_RE.captures(line) else {
                continue;
            };
            // The alternation restricts capture 1 to fan-out role names.
            let Ok(to) = caps[1].parse::<Role>() else {
                continue;
            };
            let message = caps[2].trim();
            if message.is_empty() {
                continue;
            }
            requests.push(PeerRequest {
                from: item.role,
                to,
                message: message.to_string(),
            });
        }
    }
    requests
}

/// Group requests into a per-addressee inbox of formatted messages.
pub fn build_inbox(requests: &[PeerRequest]) -> BTreeMap<Role, Vec<String>> {
    let mut inbox: BTreeMap<Role, Vec<String>> = BTreeMap::new();
    for req in requests {
        inbox
            .entry(req.to)
            .or_default()
            .push(format!("from {}: {}", req.from, req.message));
    }
    inbox
}
