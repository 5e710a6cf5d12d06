//! Sequential batch runner: launch one child process per environment from a
//! TOML plan, optionally waiting for the operator between runs.

use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Command, ExitStatus};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::BatchError;

/// Placeholder replaced by the environment name in every argument.
pub const ENV_PLACEHOLDER: &str = "{env}";

fn default_confirm() -> bool {
    true
}

/// A batch of runs, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchPlan {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub envs: Vec<String>,
    /// Wait for a line on stdin before each run.
    #[serde(default = "default_confirm")]
    pub confirm: bool,
}

impl BatchPlan {
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let content = std::fs::read_to_string(path).map_err(|e| BatchError::PlanRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, BatchError> {
        let plan: BatchPlan = toml::from_str(s)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.program.trim().is_empty() {
            return Err(BatchError::Validation("program must not be empty".into()));
        }
        if self.envs.is_empty() {
            return Err(BatchError::Validation("envs must list at least one environment".into()));
        }
        if self.envs.iter().any(|e| e.trim().is_empty()) {
            return Err(BatchError::Validation("environment names must not be empty".into()));
        }
        Ok(())
    }

    /// Arguments for one run, with the placeholder substituted.
    pub fn args_for(&self, env: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(ENV_PLACEHOLDER, env))
            .collect()
    }

    pub fn command_for(&self, env: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args_for(env));
        command
    }

    /// Shell-like rendering of the command line, for logs and dry runs.
    pub fn command_line(&self, env: &str) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args_for(env))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How one child run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// Exited unsuccessfully; `None` when killed by a signal.
    Failed(Option<i32>),
    SpawnFailed(String),
    /// Dry run: printed, not launched.
    Skipped,
}

impl RunOutcome {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed(status.code())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRun {
    pub env: String,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub runs: Vec<EnvRun>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.outcome == RunOutcome::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| matches!(r.outcome, RunOutcome::Failed(_) | RunOutcome::SpawnFailed(_)))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

pub struct BatchRunner {
    plan: BatchPlan,
    dry_run: bool,
}

impl BatchRunner {
    pub fn new(plan: BatchPlan) -> Self {
        BatchRunner {
            plan,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Run every environment in order. A failed child is reported and the
    /// batch moves on to the next environment.
    pub fn run<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<BatchReport, BatchError> {
        let mut report = BatchReport::default();

        for env in &self.plan.envs {
            if self.plan.confirm {
                write!(output, "Waiting next env {env} > ")?;
                output.flush()?;
                let mut line = String::new();
                input.read_line(&mut line)?;
                writeln!(output, "Start next env > {env}")?;
            }

            let command_line = self.plan.command_line(env);
            let outcome = if self.dry_run {
                writeln!(output, "{command_line}")?;
                RunOutcome::Skipped
            } else {
                info!("running: {command_line}");
                match self.plan.command_for(env).status() {
                    Ok(status) => RunOutcome::from_status(status),
                    Err(e) => RunOutcome::SpawnFailed(e.to_string()),
                }
            };

            match &outcome {
                RunOutcome::Failed(code) => {
                    warn!("run for {env} failed (exit code {code:?}), continuing")
                }
                RunOutcome::SpawnFailed(e) => {
                    warn!("could not start run for {env}: {e}, continuing")
                }
                RunOutcome::Succeeded | RunOutcome::Skipped => {}
            }

            report.runs.push(EnvRun {
                env: env.clone(),
                outcome,
            });
        }

        Ok(report)
    }
}
