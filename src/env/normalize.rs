use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::env::{Action, Observation, Space, Step, VecEnv};
use crate::error::{BackendError, CheckpointError};

pub const OBS_RMS_FILE: &str = "obs_rms.json";
pub const RET_RMS_FILE: &str = "ret_rms.json";

/// Options for the normalization layer, as written under `normalize:` in the
/// hyperparameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeOptions {
    #[serde(deserialize_with = "lenient_bool")]
    pub norm_obs: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub norm_reward: bool,
    pub clip_obs: f64,
    pub clip_reward: f64,
    pub gamma: f64,
    pub epsilon: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            norm_obs: true,
            norm_reward: true,
            clip_obs: 10.0,
            clip_reward: 10.0,
            gamma: 0.99,
            epsilon: 1e-8,
        }
    }
}

/// Accepts YAML booleans as well as `True`/`False` strings.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Text(String),
    }

    match BoolLike::deserialize(deserializer)? {
        BoolLike::Bool(b) => Ok(b),
        BoolLike::Text(s) => match s.as_str() {
            "True" | "true" => Ok(true),
            "False" | "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got '{other}'"
            ))),
        },
    }
}

/// Running mean and variance, merged batch by batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
    pub count: f64,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        RunningMeanStd {
            mean: vec![0.0; dim],
            var: vec![1.0; dim],
            count: 1e-4,
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Fold a batch of samples (each of length `dim`) into the statistics.
    pub fn update(&mut self, batch: &[Vec<f64>]) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len() as f64;
        let dim = self.dim();
        let mut batch_mean = vec![0.0; dim];
        for sample in batch {
            for (m, x) in batch_mean.iter_mut().zip(sample) {
                *m += x / n;
            }
        }
        let mut batch_var = vec![0.0; dim];
        for sample in batch {
            for ((v, x), m) in batch_var.iter_mut().zip(sample).zip(&batch_mean) {
                *v += (x - m) * (x - m) / n;
            }
        }
        self.update_from_moments(&batch_mean, &batch_var, n);
    }

    fn update_from_moments(&mut self, batch_mean: &[f64], batch_var: &[f64], batch_count: f64) {
        let total = self.count + batch_count;
        for i in 0..self.dim() {
            let delta = batch_mean[i] - self.mean[i];
            let m_a = self.var[i] * self.count;
            let m_b = batch_var[i] * batch_count;
            let m2 = m_a + m_b + delta * delta * self.count * batch_count / total;
            self.mean[i] += delta * batch_count / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }
}

/// Normalizes observations and rewards with running statistics.
pub struct VecNormalize {
    venv: Box<dyn VecEnv>,
    options: NormalizeOptions,
    obs_rms: RunningMeanStd,
    ret_rms: RunningMeanStd,
    returns: Vec<f64>,
    training: bool,
}

impl VecNormalize {
    pub fn new(venv: Box<dyn VecEnv>, options: NormalizeOptions) -> Self {
        let obs_dim = venv.observation_space().flat_dim();
        let num_envs = venv.num_envs();
        VecNormalize {
            venv,
            options,
            obs_rms: RunningMeanStd::new(obs_dim),
            ret_rms: RunningMeanStd::new(1),
            returns: vec![0.0; num_envs],
            training: true,
        }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn obs_rms(&self) -> &RunningMeanStd {
        &self.obs_rms
    }

    pub fn ret_rms(&self) -> &RunningMeanStd {
        &self.ret_rms
    }

    /// Freeze (or unfreeze) the statistics, e.g. for evaluation.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn normalize_obs(&self, obs: &[f32]) -> Observation {
        if !self.options.norm_obs {
            return obs.to_vec();
        }
        let clip = self.options.clip_obs;
        obs.iter()
            .zip(self.obs_rms.mean.iter().zip(&self.obs_rms.var))
            .map(|(&x, (m, v))| {
                let z = (f64::from(x) - m) / (v + self.options.epsilon).sqrt();
                z.clamp(-clip, clip) as f32
            })
            .collect()
    }

    fn normalize_reward(&self, reward: f32) -> f32 {
        if !self.options.norm_reward {
            return reward;
        }
        let clip = self.options.clip_reward;
        let scaled = f64::from(reward) / (self.ret_rms.var[0] + self.options.epsilon).sqrt();
        scaled.clamp(-clip, clip) as f32
    }

    /// Write `obs_rms.json` and `ret_rms.json` into `dir`.
    pub fn save_running_average(&self, dir: &Path) -> Result<(), CheckpointError> {
        for (name, rms) in [(OBS_RMS_FILE, &self.obs_rms), (RET_RMS_FILE, &self.ret_rms)] {
            let path = dir.join(name);
            let json = serde_json::to_string_pretty(rms)?;
            fs::write(&path, json).map_err(|source| CheckpointError::Write { path, source })?;
        }
        Ok(())
    }

    /// Replace the statistics with the ones saved in `dir`.
    pub fn load_running_average(&mut self, dir: &Path) -> Result<(), CheckpointError> {
        let obs_rms = read_rms(&dir.join(OBS_RMS_FILE))?;
        let ret_rms = read_rms(&dir.join(RET_RMS_FILE))?;
        if obs_rms.dim() != self.obs_rms.dim() || ret_rms.dim() != 1 {
            return Err(CheckpointError::StatsShape {
                path: dir.to_path_buf(),
            });
        }
        self.obs_rms = obs_rms;
        self.ret_rms = ret_rms;
        Ok(())
    }
}

fn read_rms(path: &Path) -> Result<RunningMeanStd, CheckpointError> {
    let json = fs::read_to_string(path).map_err(|source| CheckpointError::StatsRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| CheckpointError::StatsParse {
        path: path.to_path_buf(),
        source,
    })
}

impl VecEnv for VecNormalize {
    fn num_envs(&self) -> usize {
        self.venv.num_envs()
    }

    fn observation_space(&self) -> &Space {
        self.venv.observation_space()
    }

    fn action_space(&self) -> &Space {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, BackendError> {
        let observations = self.venv.reset()?;
        self.returns.iter_mut().for_each(|r| *r = 0.0);
        Ok(observations.iter().map(|o| self.normalize_obs(o)).collect())
    }

    fn step(&mut self, actions: &[Action]) -> Result<Vec<Step>, BackendError> {
        let steps = self.venv.step(actions)?;

        for (ret, step) in self.returns.iter_mut().zip(&steps) {
            *ret = *ret * self.options.gamma + f64::from(step.reward);
        }
        if self.training {
            let batch: Vec<Vec<f64>> = steps
                .iter()
                .map(|s| s.observation.iter().map(|&x| f64::from(x)).collect())
                .collect();
            self.obs_rms.update(&batch);
            let returns: Vec<Vec<f64>> = self.returns.iter().map(|&r| vec![r]).collect();
            self.ret_rms.update(&returns);
        }

        let normalized = steps
            .into_iter()
            .map(|step| Step {
                observation: self.normalize_obs(&step.observation),
                reward: self.normalize_reward(step.reward),
                done: step.done,
            })
            .collect::<Vec<_>>();

        for (ret, step) in self.returns.iter_mut().zip(&normalized) {
            if step.done {
                *ret = 0.0;
            }
        }
        Ok(normalized)
    }

    fn wrapped(&self) -> Option<&dyn VecEnv> {
        Some(self.venv.as_ref())
    }

    fn wrapped_mut(&mut self) -> Option<&mut dyn VecEnv> {
        Some(self.venv.as_mut())
    }

    fn as_normalizer(&self) -> Option<&VecNormalize> {
        Some(self)
    }

    fn as_normalizer_mut(&mut self) -> Option<&mut VecNormalize> {
        Some(self)
    }
}
