use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use hil_agents::{
    fallback_report, parse_next_experiments, probe_backend, AgentState, Orchestrator,
    OrchestratorConfig, Role, StatusCallback,
};

/// 5-agent async NIM orchestrator for UART HIL evidence triage.
#[derive(Parser)]
#[command(name = "hil-agents", version)]
struct Args {
    /// Evidence bundle (merged log/metrics excerpt) to triage.
    #[arg(long)]
    prompt: String,
    /// Print live agent status transitions to stdout.
    #[arg(long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = OrchestratorConfig::from_env();
    info!(
        chat_url = %config.chat_url,
        model = %config.model,
        mode = %config.execution_mode,
        "NIM orchestrator starting"
    );

    let backend = probe_backend(&config).await;

    let status: Option<StatusCallback> = if args.trace {
        Some(Arc::new(|role: Role, state: AgentState, message: &str| {
            let fragment: String = message.chars().take(120).collect();
            println!("[{role}] {state}: {fragment}");
        }))
    } else {
        None
    };

    let orchestrator = Orchestrator::new(config, backend, status);
    let report = match orchestrator.run(&args.prompt).await {
        Ok(report) => report,
        // Unexpected orchestration failure: the caller owns the fallback.
        Err(e) => fallback_report(&e.to_string(), &args.prompt),
    };
    println!("{report}");

    let proposals = parse_next_experiments(&report);
    if !proposals.is_empty() {
        info!(count = proposals.len(), "parsed next-experiment proposals");
    }

    Ok(())
}
