use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crew::artifact::FsArtifactStore;
use crew::orchestration::{ShellExecutor, TeamCoordinator, TeamManifest};
use crew::plan::TeamPlan;
use crew::{clog, Config, Result, TaskStatus};

/// Crew - dependency-driven task orchestration engine
#[derive(Parser, Debug)]
#[command(name = "crew")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CREW_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.crew/crew.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a team plan file and print the teardown manifest as JSON
    Run {
        /// Path to the JSON plan file
        plan: PathBuf,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Parse and statically check a plan file without executing it
    Validate {
        /// Path to the JSON plan file
        plan: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    crew::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Run { plan, workers } => run_plan(plan, workers),
        Command::Validate { plan } => validate_plan(plan),
    }
}

/// Execute a plan: build a team of shell workers, drive it to
/// completion, and print the complete manifest.
fn run_plan(path: PathBuf, workers: Option<usize>) -> Result<()> {
    clog!("Run command: plan={}", path.display());

    let plan = TeamPlan::load(&path)?;
    plan.validate()?;

    let mut config = Config::load()?;
    if let Some(workers) = workers {
        config.max_workers = workers;
    }
    config.ensure_dirs()?;
    let store = Arc::new(FsArtifactStore::new(config.artifacts_dir()?)?);

    let rt = tokio::runtime::Runtime::new()?;
    let manifest = rt.block_on(async {
        let mut coordinator =
            TeamCoordinator::new(&config, Arc::new(ShellExecutor::new()), store);
        plan.register(&mut coordinator).await?;
        coordinator.run().await
    })?;

    println!("{}", serde_json::to_string_pretty(&manifest)?);

    if !manifest.fully_succeeded() {
        clog!(
            "Run finished with failures: {}/{} tasks succeeded",
            succeeded_count(&manifest),
            manifest.tasks.len()
        );
        std::process::exit(1);
    }
    Ok(())
}

/// Validate a plan and print a short summary of what it would run.
fn validate_plan(path: PathBuf) -> Result<()> {
    clog!("Validate command: plan={}", path.display());

    let plan = TeamPlan::load(&path)?;
    plan.validate()?;

    let dependency_count: usize = plan.tasks.iter().map(|task| task.depends_on.len()).sum();
    println!(
        "Plan {} is valid: {} tasks, {} dependencies",
        plan.name.as_deref().unwrap_or("(unnamed)"),
        plan.tasks.len(),
        dependency_count
    );
    Ok(())
}

fn succeeded_count(manifest: &TeamManifest) -> usize {
    manifest
        .tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Finished(crew::Outcome::Succeeded))
        .count()
}
