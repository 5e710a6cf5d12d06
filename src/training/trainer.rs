use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::algos::{AlgorithmRegistry, ModelContext};
use crate::checkpoint::{
    stats_dir_for_checkpoint, validate_trained_agent, EnvLayers, RunDirectory, RunMetadata,
    RunSummary,
};
use crate::config::ZooConfig;
use crate::env::{normalizer_mut, ComposedEnv, EnvBackend, EnvComposer, EnvRequest};
use crate::error::{CheckpointError, TrainingError};
use crate::hyperparams::{describe, HyperparameterSet};
use crate::noise::configure_noise;
use crate::telemetry;
use crate::training::TrainArgs;

/// How the model for this run comes into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartMode {
    /// Continue training a saved model.
    Resume(PathBuf),
    /// Build a new model from the hyperparameters.
    Fresh,
}

impl StartMode {
    pub fn from_trained_agent(path: Option<&Path>) -> Result<Self, CheckpointError> {
        match path {
            Some(path) => {
                validate_trained_agent(path)?;
                Ok(StartMode::Resume(path.to_path_buf()))
            }
            None => Ok(StartMode::Fresh),
        }
    }
}

/// One training run: load hyperparameters, compose the environment, build or
/// resume the model, learn, and save everything into a new run directory.
pub struct Trainer {
    args: TrainArgs,
    config: ZooConfig,
}

impl Trainer {
    pub fn new(args: TrainArgs, config: ZooConfig) -> Self {
        Trainer { args, config }
    }

    /// Run to completion. Nothing is written under the log folder unless
    /// learning succeeds.
    pub fn run(
        &self,
        registry: &AlgorithmRegistry,
        backend: &dyn EnvBackend,
    ) -> Result<RunSummary, TrainingError> {
        let args = &self.args;
        let algo = args.algo;
        let start = StartMode::from_trained_agent(args.trained_agent.as_deref())?;
        let factory = registry.get(algo)?;
        let tensorboard_log = args.tensorboard_dir();

        info!("{} {} {} {}", "=".repeat(10), args.env, algo, "=".repeat(10));

        let encoder = match &args.vae_path {
            Some(path) => {
                info!("Loading VAE ...");
                let encoder = backend
                    .load_encoder(path)
                    .map_err(|source| TrainingError::EncoderLoad {
                        path: path.clone(),
                        source,
                    })?;
                Some(encoder)
            }
            None => {
                info!("Learning from pixels...");
                None
            }
        };

        let mut hyperparams =
            HyperparameterSet::load(&self.config.paths.hyperparams_dir, algo, &args.env)?;
        let snapshot = hyperparams.snapshot();
        for (key, value) in &snapshot {
            info!("  {key}: {}", describe(value));
        }

        let controls = hyperparams.take_controls(args.n_timesteps_override())?;
        let mut kwargs = hyperparams.into_kwargs()?;

        let ComposedEnv {
            mut env,
            normalized,
            n_stack,
        } = EnvComposer::new(&self.config.normalization).compose(
            backend,
            EnvRequest {
                algo,
                seed: args.seed,
                encoder: encoder.clone(),
                normalize: controls.normalize,
                frame_stack: controls.frame_stack,
            },
        )?;

        if let Some(noise) = &controls.noise {
            if algo.uses_action_noise() {
                let configured = configure_noise(noise, env.action_space(), &self.config.noise)?;
                info!("Applying {} noise with std {}", noise.noise_type.trim(), noise.std);
                kwargs.insert(configured.kwarg().to_string(), configured.into_hyper_value());
            } else {
                warn!(
                    "ignoring noise_type '{}': {} does not use action noise",
                    noise.noise_type, algo
                );
            }
        }

        let ctx = ModelContext {
            tensorboard_log,
            verbose: self.config.model.verbose,
            seed: args.seed,
            ..ModelContext::for_env(algo, env.as_ref())
        };

        let mut model = match &start {
            StartMode::Resume(path) => {
                info!("Loading pretrained agent");
                kwargs.remove("policy");
                let model = factory
                    .load(path, &ctx, kwargs)
                    .map_err(|source| TrainingError::ModelLoad {
                        path: path.clone(),
                        source,
                    })?;
                if normalized {
                    info!("Loading saved running average");
                    normalizer_mut(env.as_mut())
                        .ok_or(TrainingError::MissingNormalizer)?
                        .load_running_average(&stats_dir_for_checkpoint(path))?;
                }
                model
            }
            StartMode::Fresh => factory
                .create(&ctx, kwargs)
                .map_err(TrainingError::ModelCreate)?,
        };

        model
            .learn(env.as_mut(), controls.n_timesteps, args.log_interval_override())
            .map_err(TrainingError::Learn)?;
        env.reset().map_err(TrainingError::Env)?;

        let run = RunDirectory::allocate(&args.log_folder, algo, &args.env)?;
        run.save_model(model.as_ref())?;
        run.save_config(&snapshot)?;

        if args.save_vae {
            if let Some(encoder) = &encoder {
                info!("Saving VAE");
                run.save_encoder(encoder.as_ref())?;
            }
        }

        if normalized {
            let normalizer = normalizer_mut(env.as_mut()).ok_or(TrainingError::MissingNormalizer)?;
            run.save_running_average(normalizer)?;
        }

        let mut metadata =
            RunMetadata::new(algo, &args.env, run.run_index(), args.seed, controls.n_timesteps);
        metadata.layers = EnvLayers {
            normalized,
            frame_stack: n_stack,
            visual_encoder: encoder.is_some(),
        };
        if let StartMode::Resume(path) = start {
            metadata.resumed_from = Some(path);
        }
        run.save_metadata(&metadata)?;

        info!("Saved model to {}", run.model_path().display());
        Ok(run.summary(controls.n_timesteps))
    }
}

/// Entry point for a backend's `train` binary: set up logging, parse the
/// process arguments, run, and print the run directory.
pub fn run_cli(
    registry: &AlgorithmRegistry,
    backend: &dyn EnvBackend,
) -> anyhow::Result<RunSummary> {
    telemetry::init()?;
    run_with_args(TrainArgs::parse(), registry, backend)
}

/// [`run_cli`] for already parsed arguments: load the settings file named
/// by `--config`, then train.
pub fn run_with_args(
    args: TrainArgs,
    registry: &AlgorithmRegistry,
    backend: &dyn EnvBackend,
) -> anyhow::Result<RunSummary> {
    let config = ZooConfig::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let summary = Trainer::new(args, config)
        .run(registry, backend)
        .context("training failed")?;
    println!("{}", summary.run_dir.display());
    Ok(summary)
}
