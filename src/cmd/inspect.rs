//! Read-only views of a run: `triage status` and `triage transitions`.

use anyhow::Result;
use std::process::ExitCode;

use repo_triage::flow::NodeId;

use super::Context;

pub async fn cmd_status(ctx: &Context, run_id: &str) -> Result<ExitCode> {
    let state = ctx.runner.status(run_id).await?;

    println!("run_id: {}", state.run_id);
    println!("status: {}", state.run_status());
    println!("node: {} ({})", state.node_id, state.state);
    for node in NodeId::TRACKED {
        match state.branch_failures.get(&node) {
            Some(reason) => println!("  {:<13} {}  {}", node, state.status(node), reason),
            None => println!("  {:<13} {}", node, state.status(node)),
        }
    }
    if let Some(run) = ctx.runner.scanner_run(run_id).await? {
        println!("source: {} ({})", run.resolved_path, run.status);
    }
    if let Some(manifest) = &state.run_manifest {
        println!(
            "provider: {} ({})",
            manifest.provider.profile, manifest.provider.model
        );
        if let Some(sha) = &manifest.repo.git_commit_sha {
            println!("commit: {}", sha);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_transitions(ctx: &Context, run_id: &str) -> Result<ExitCode> {
    let records = ctx.runner.transitions(run_id).await?;
    if records.is_empty() {
        println!("No transitions recorded for run {}", run_id);
        return Ok(ExitCode::SUCCESS);
    }
    for record in records {
        println!(
            "{:>4}  {}  {:<13} {} -> {}  {}",
            record.id,
            record.timestamp.to_rfc3339(),
            record.node_id,
            record.from_state,
            record.to_state,
            record.reason.as_deref().unwrap_or("")
        );
    }
    Ok(ExitCode::SUCCESS)
}
