//! Algorithm identifiers and the seam to the RL backend: the [`Model`]
//! interface every trained algorithm exposes, and the [`AlgorithmFactory`]
//! registry used to construct or resume one.

mod registry;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::env::{Space, VecEnv};
use crate::error::BackendError;

pub use registry::{AlgorithmFactory, AlgorithmRegistry};

/// Supported algorithm keys. Each maps to `hyperparams/<key>.yml`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum Algo {
    A2c,
    Acer,
    Acktr,
    Ddpg,
    Dqn,
    Ppo2,
    Sac,
    Trpo,
}

impl Algo {
    pub const ALL: [Algo; 8] = [
        Algo::A2c,
        Algo::Acer,
        Algo::Acktr,
        Algo::Ddpg,
        Algo::Dqn,
        Algo::Ppo2,
        Algo::Sac,
        Algo::Trpo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Algo::A2c => "a2c",
            Algo::Acer => "acer",
            Algo::Acktr => "acktr",
            Algo::Ddpg => "ddpg",
            Algo::Dqn => "dqn",
            Algo::Ppo2 => "ppo2",
            Algo::Sac => "sac",
            Algo::Trpo => "trpo",
        }
    }

    /// Whether the algorithm explores with continuous action / parameter noise.
    pub fn uses_action_noise(self) -> bool {
        matches!(self, Algo::Ddpg)
    }
}

impl fmt::Display for Algo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a factory needs besides the hyperparameters.
#[derive(Debug, Clone)]
pub struct ModelContext {
    pub algo: Algo,
    pub observation_space: Space,
    pub action_space: Space,
    pub num_envs: usize,
    pub tensorboard_log: Option<PathBuf>,
    pub verbose: u8,
    pub seed: u64,
}

impl ModelContext {
    pub fn for_env(algo: Algo, env: &dyn VecEnv) -> Self {
        ModelContext {
            algo,
            observation_space: env.observation_space().clone(),
            action_space: env.action_space().clone(),
            num_envs: env.num_envs(),
            tensorboard_log: None,
            verbose: 1,
            seed: 0,
        }
    }
}

/// Common interface of a trainable model returned by a factory.
pub trait Model {
    /// Run the learning loop for `total_timesteps` environment steps.
    /// `log_interval` overrides the backend's default when set.
    fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        total_timesteps: u64,
        log_interval: Option<u32>,
    ) -> Result<(), BackendError>;

    /// Serialize the model to `path` (extension included).
    fn save(&self, path: &Path) -> Result<(), BackendError>;
}
