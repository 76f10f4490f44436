use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "triage")]
#[command(version, about = "Checkpointed repository analysis: scan, fan out, synthesize a roadmap")]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to triage.toml (defaults to .triage/triage.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the flow database (defaults to .triage/triage.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a local directory or a GitHub repository
    Analyze {
        /// Local repository directory
        #[arg(long, conflicts_with = "github_url", required_unless_present = "github_url")]
        path: Option<PathBuf>,

        /// GitHub repository URL to clone
        #[arg(long)]
        github_url: Option<String>,

        /// Branch to clone (GitHub only)
        #[arg(long, requires = "github_url")]
        branch: Option<String>,

        /// Commit to check out after cloning (GitHub only)
        #[arg(long, requires = "github_url")]
        commit: Option<String>,

        /// Run id; generated when omitted
        #[arg(long)]
        run_id: Option<String>,

        /// Where summary.json and report.md are written
        #[arg(long, default_value = "artifacts")]
        output_dir: PathBuf,

        /// Provider profile from the config
        #[arg(long)]
        profile: Option<String>,

        /// Disable semgrep, bandit, and osv-scanner for this run
        #[arg(long)]
        skip_tools: bool,

        /// Skip files larger than this many bytes
        #[arg(long)]
        max_file_size_bytes: Option<u64>,
    },
    /// Continue a run from its latest checkpoint
    Resume {
        #[arg(long)]
        run_id: String,

        #[arg(long, default_value = "artifacts")]
        output_dir: PathBuf,
    },
    /// Show per-node status of a run
    Status {
        #[arg(long)]
        run_id: String,
    },
    /// Print the transition log of a run
    Transitions {
        #[arg(long)]
        run_id: String,
    },
}

fn init_logging(verbose: bool, log_json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn dispatch(cli: &Cli) -> Result<ExitCode> {
    let ctx = cmd::Context::load(cli)?;
    match &cli.command {
        Commands::Analyze {
            path,
            github_url,
            branch,
            commit,
            run_id,
            output_dir,
            profile,
            skip_tools,
            ..
        } => {
            let args = cmd::AnalyzeArgs {
                path: path.clone(),
                github_url: github_url.clone(),
                branch: branch.clone(),
                commit: commit.clone(),
                run_id: run_id.clone(),
                output_dir: output_dir.clone(),
                profile: profile.clone(),
                skip_tools: *skip_tools,
            };
            cmd::cmd_analyze(&ctx, args).await
        }
        Commands::Resume { run_id, output_dir } => cmd::cmd_resume(&ctx, run_id, output_dir).await,
        Commands::Status { run_id } => cmd::cmd_status(&ctx, run_id).await,
        Commands::Transitions { run_id } => cmd::cmd_transitions(&ctx, run_id).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match dispatch(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
