use std::path::PathBuf;

use crate::algos::Algo;

/// Errors raised by backend adapters (environments, models, encoders).
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when loading settings or hyperparameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),

    #[error("failed to read hyperparameters from {path}: {source}")]
    HyperparamsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse hyperparameters in {path}: {source}")]
    HyperparamsParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("no hyperparameters for environment '{env}' in {path}")]
    MissingSection { env: String, path: PathBuf },

    #[error("hyperparameters for environment '{0}' must be a mapping")]
    SectionNotMapping(String),

    #[error("n_timesteps is missing from the hyperparameters and no override was given")]
    MissingTimesteps,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("invalid schedule for {key}: {value}")]
    InvalidSchedule { key: String, value: String },

    #[error("unknown noise type \"{0}\"")]
    UnknownNoiseType(String),

    #[error("action noise requires a continuous action space")]
    NoiseOnDiscreteActions,

    #[error("normalization is not supported for {0}")]
    NormalizationUnsupported(Algo),
}

/// Errors that can occur while validating checkpoints or writing run artifacts.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("the trained agent must be a valid path to a .pkl file: {0}")]
    InvalidTrainedAgent(PathBuf),

    #[error("failed to create run directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to list run directories in {path}: {source}")]
    ListRuns {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read running statistics from {path}: {source}")]
    StatsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse running statistics from {path}: {source}")]
    StatsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to read run metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse run metadata from {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("run index of {path} does not fit in a u32")]
    RunIndexOverflow { path: PathBuf },

    #[error("running statistics in {path} do not match the observation shape")]
    StatsShape { path: PathBuf },

    #[error("failed to serialize config snapshot: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to save model to {path}: {source}")]
    ModelSave { path: PathBuf, source: BackendError },

    #[error("failed to save visual encoder to {path}: {source}")]
    EncoderSave { path: PathBuf, source: BackendError },
}

/// Errors that can occur during a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("no backend registered for algorithm '{0}'")]
    UnknownAlgorithm(Algo),

    #[error("failed to load visual encoder from {path}: {source}")]
    EncoderLoad { path: PathBuf, source: BackendError },

    #[error("environment error: {0}")]
    Env(BackendError),

    #[error("failed to create model: {0}")]
    ModelCreate(BackendError),

    #[error("failed to load model from {path}: {source}")]
    ModelLoad { path: PathBuf, source: BackendError },

    #[error("learning failed: {0}")]
    Learn(BackendError),

    #[error("environment has no normalization layer")]
    MissingNormalizer,
}

/// Errors that can occur in the batch runner.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to read batch plan {path}: {source}")]
    PlanRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse batch plan: {0}")]
    PlanParse(#[from] toml::de::Error),

    #[error("batch plan validation error: {0}")]
    Validation(String),

    #[error("terminal I/O error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Errors that can occur while stacking frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameStackError {
    #[error("failed to read frame directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("n_stack must be at least 1")]
    EmptyStack,

    #[error("need at least {needed} frames, found {found}")]
    NotEnoughFrames { found: usize, needed: usize },

    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("frame {path} is {found} pixels wide, expected {expected}")]
    WidthMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
