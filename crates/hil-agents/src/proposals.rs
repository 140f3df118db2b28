//! Next-experiment proposal extraction from the final report.
//!
//! The summarizer is asked to emit proposals as one-line dict bullets,
//! e.g. `- {'guess_baud': 230400}`. This parser is deliberately tolerant:
//! a malformed bullet is skipped, never an error, because the report is
//! free-form model output.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Parameter keys the runner understands. Anything else is dropped.
const KNOWN_KEYS: [&str; 10] = [
    "guess_baud",
    "guess_frame",
    "guess_parity",
    "guess_magic",
    "target_baud",
    "target_frame",
    "target_parity",
    "target_magic",
    "uart_rate",
    "buffer_size",
];

/// Keys whose values are free-form strings (frame/parity names).
const TEXT_KEYS: [&str; 4] = [
    "guess_frame",
    "guess_parity",
    "target_frame",
    "target_parity",
];

/// A single proposed parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProposalValue {
    Int(i64),
    Text(String),
}

/// One structured "next experiment": runner parameter name → value.
pub type ExperimentProposal = BTreeMap<String, ProposalValue>;

/// Extract structured experiment proposals from bullet lines of a report.
pub fn parse_next_experiments(report: &str) -> Vec<ExperimentProposal> {
    let mut experiments = Vec::new();
    for line in report.lines() {
        let stripped = line.trim();
        if !stripped.starts_with('-') {
            continue;
        }
        let body = stripped.trim_start_matches(['-', ' ']).trim();
        let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
            continue;
        };
        if end <= start {
            continue;
        }
        if let Some(proposal) = parse_dict_literal(&body[start..=end]) {
            if !proposal.is_empty() {
                experiments.push(proposal);
            }
        }
    }
    experiments
}

/// Parse one `{...}` body into a filtered proposal.
///
/// Accepts single- or double-quoted keys/values. Returns `None` when the
/// body does not parse or when a known key carries an uncoercible value;
/// the whole bullet is discarded in that case.
fn parse_dict_literal(body: &str) -> Option<ExperimentProposal> {
    // Python-style dict literals become JSON once quotes are normalized.
    // Blanket replacement means an apostrophe inside a value breaks the
    // literal and the bullet is skipped; acceptable here because every
    // known text value is a frame/parity token like 8N1 or even.
    let normalized = body.replace('\'', "\"");
    let parsed: Value = serde_json::from_str(&normalized).ok()?;
    let object = parsed.as_object()?;

    let mut proposal = ExperimentProposal::new();
    for key in KNOWN_KEYS {
        let Some(value) = object.get(key) else {
            continue;
        };
        let coerced = if TEXT_KEYS.contains(&key) {
            coerce_text(value)?
        } else {
            coerce_int(value)?
        };
        proposal.insert(key.to_string(), coerced);
    }
    Some(proposal)
}

fn coerce_text(value: &Value) -> Option<ProposalValue> {
    match value {
        Value::String(s) => Some(ProposalValue::Text(s.clone())),
        Value::Number(n) => Some(ProposalValue::Text(n.to_string())),
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<ProposalValue> {
    match value {
        // Floats truncate toward zero, same as int coercion in the runner.
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(ProposalValue::Int),
        Value::String(s) => s.trim().parse().ok().map(ProposalValue::Int),
        _ => None,
    }
}
