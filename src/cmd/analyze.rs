//! `triage analyze` and `triage resume`.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use repo_triage::artifacts::GeneratedArtifacts;
use repo_triage::config::AppConfig;
use repo_triage::flow::FlowState;
use repo_triage::schema::{
    AnalyzeInput, AnalyzeRequest, ExecutionConfig, FeatureFlags, ProviderConfig, RequestTimeouts,
};

use super::Context;

pub struct AnalyzeArgs {
    pub path: Option<PathBuf>,
    pub github_url: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub run_id: Option<String>,
    pub output_dir: PathBuf,
    pub profile: Option<String>,
    pub skip_tools: bool,
}

pub async fn cmd_analyze(ctx: &Context, args: AnalyzeArgs) -> Result<ExitCode> {
    let input = match (&args.path, &args.github_url) {
        (Some(path), None) => AnalyzeInput::local(path.to_string_lossy()),
        (None, Some(url)) => AnalyzeInput::github(url.clone())
            .with_branch(args.branch.clone())
            .with_commit(args.commit.clone()),
        _ => bail!("Exactly one of --path or --github-url is required"),
    };
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let config = ctx.runner.config();
    let execution = execution_for(config, args.profile.as_deref(), args.skip_tools);
    let request = AnalyzeRequest::new(run_id, input).with_execution(execution);

    let state = ctx.runner.kickoff(&request, args.profile.as_deref()).await?;
    finish(ctx, &state, &args.output_dir)
}

pub async fn cmd_resume(ctx: &Context, run_id: &str, output_dir: &Path) -> Result<ExitCode> {
    let state = ctx.runner.resume(run_id).await?;
    finish(ctx, &state, output_dir)
}

/// Request execution settings derived from the active profile and config.
fn execution_for(config: &AppConfig, profile: Option<&str>, skip_tools: bool) -> ExecutionConfig {
    let provider = config
        .profile(profile)
        .map(|(_, p)| ProviderConfig {
            kind: p.kind,
            model: p.model.clone(),
            temperature: p.temperature,
            seed: p.seed,
            max_tokens: p.max_tokens,
        })
        .unwrap_or_default();
    ExecutionConfig {
        provider,
        timeouts: RequestTimeouts {
            scanner_seconds: config.timeouts.scanner_seconds,
            agent_seconds: config.timeouts.agent_seconds,
        },
        feature_flags: if skip_tools {
            FeatureFlags::none()
        } else {
            config.feature_flags
        },
    }
}

fn finish(ctx: &Context, state: &FlowState, output_dir: &Path) -> Result<ExitCode> {
    let GeneratedArtifacts {
        summary_path,
        report_path,
        ..
    } = ctx.runner.materialize_artifacts(state, output_dir)?;

    println!("run_id: {}", state.run_id);
    println!("status: {}", state.run_status());
    for (node, reason) in &state.branch_failures {
        println!("failure[{}]: {}", node, reason);
    }
    println!("summary: {}", summary_path.display());
    println!("report: {}", report_path.display());
    Ok(ExitCode::SUCCESS)
}
