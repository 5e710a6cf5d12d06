use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use drive_zoo::batch::{BatchPlan, BatchRunner};
use drive_zoo::telemetry;

/// Run a training command once per environment listed in a batch plan.
#[derive(Parser)]
#[command(name = "batch_train", about = "Run a batch plan sequentially")]
struct Cli {
    /// Path to the batch plan TOML file
    #[arg(long)]
    plan: PathBuf,

    /// Do not wait for Enter before each environment
    #[arg(long)]
    no_confirm: bool,

    /// Print the commands instead of running them
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init()?;

    let mut plan = BatchPlan::load(&cli.plan)
        .with_context(|| format!("loading batch plan from {}", cli.plan.display()))?;
    if cli.no_confirm {
        plan.confirm = false;
    }

    let runner = BatchRunner::new(plan).with_dry_run(cli.dry_run);
    let stdin = std::io::stdin();
    let report = runner
        .run(&mut stdin.lock(), &mut std::io::stdout())
        .context("running batch")?;

    tracing::info!(
        "batch finished: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    if !report.all_succeeded() {
        bail!("{} of {} runs failed", report.failed(), report.runs.len());
    }
    Ok(())
}
