//! Exploration noise for algorithms that act in continuous action spaces.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::config::NoiseSettings;
use crate::env::Space;
use crate::error::ConfigError;
use crate::hyperparams::HyperValue;

/// Noise parameters taken from the hyperparameter file
/// (`noise_type` / `noise_std`).
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseParams {
    pub noise_type: String,
    pub std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    AdaptiveParam,
    Normal,
    OrnsteinUhlenbeck,
}

impl NoiseKind {
    /// Substring match, checked in this order: `adaptive-param`, `normal`,
    /// `ornstein-uhlenbeck`.
    pub fn parse(noise_type: &str) -> Result<Self, ConfigError> {
        let noise_type = noise_type.trim();
        if noise_type.contains("adaptive-param") {
            Ok(NoiseKind::AdaptiveParam)
        } else if noise_type.contains("normal") {
            Ok(NoiseKind::Normal)
        } else if noise_type.contains("ornstein-uhlenbeck") {
            Ok(NoiseKind::OrnsteinUhlenbeck)
        } else {
            Err(ConfigError::UnknownNoiseType(noise_type.to_string()))
        }
    }
}

/// Noise added to the actions the policy outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ActionNoise {
    /// Independent Gaussian noise at every step.
    Normal { mean: Vec<f64>, sigma: Vec<f64> },
    /// Temporally correlated noise that reverts to `mean`.
    OrnsteinUhlenbeck {
        mean: Vec<f64>,
        sigma: Vec<f64>,
        theta: f64,
        dt: f64,
        state: Vec<f64>,
    },
}

impl ActionNoise {
    pub fn normal(n_actions: usize, std: f64) -> Self {
        ActionNoise::Normal {
            mean: vec![0.0; n_actions],
            sigma: vec![std; n_actions],
        }
    }

    pub fn ornstein_uhlenbeck(n_actions: usize, std: f64, theta: f64, dt: f64) -> Self {
        ActionNoise::OrnsteinUhlenbeck {
            mean: vec![0.0; n_actions],
            sigma: vec![std; n_actions],
            theta,
            dt,
            state: vec![0.0; n_actions],
        }
    }

    pub fn mean(&self) -> &[f64] {
        match self {
            ActionNoise::Normal { mean, .. } | ActionNoise::OrnsteinUhlenbeck { mean, .. } => mean,
        }
    }

    pub fn sigma(&self) -> &[f64] {
        match self {
            ActionNoise::Normal { sigma, .. } | ActionNoise::OrnsteinUhlenbeck { sigma, .. } => {
                sigma
            }
        }
    }

    /// Draw the next noise vector.
    pub fn sample<R: Rng>(&mut self, rng: &mut R) -> Vec<f64> {
        match self {
            ActionNoise::Normal { mean, sigma } => mean
                .iter()
                .zip(sigma.iter())
                .map(|(m, s)| m + s * rng.sample::<f64, _>(StandardNormal))
                .collect(),
            ActionNoise::OrnsteinUhlenbeck {
                mean,
                sigma,
                theta,
                dt,
                state,
            } => {
                for ((x, m), s) in state.iter_mut().zip(mean.iter()).zip(sigma.iter()) {
                    let z: f64 = rng.sample(StandardNormal);
                    *x += *theta * (m - *x) * *dt + s * dt.sqrt() * z;
                }
                state.clone()
            }
        }
    }

    /// Restart the process at zero. No-op for Gaussian noise.
    pub fn reset(&mut self) {
        if let ActionNoise::OrnsteinUhlenbeck { state, .. } = self {
            state.iter_mut().for_each(|x| *x = 0.0);
        }
    }
}

/// Parameter-space noise whose scale adapts to hit a target action stddev.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveParamNoiseSpec {
    pub initial_stddev: f64,
    pub desired_action_stddev: f64,
    pub adoption_coefficient: f64,
    pub current_stddev: f64,
}

impl AdaptiveParamNoiseSpec {
    pub fn new(initial_stddev: f64, desired_action_stddev: f64, adoption_coefficient: f64) -> Self {
        AdaptiveParamNoiseSpec {
            initial_stddev,
            desired_action_stddev,
            adoption_coefficient,
            current_stddev: initial_stddev,
        }
    }

    /// Shrink the perturbation when the induced action distance overshoots
    /// the target, grow it otherwise.
    pub fn adapt(&mut self, distance: f64) {
        if distance > self.desired_action_stddev {
            self.current_stddev /= self.adoption_coefficient;
        } else {
            self.current_stddev *= self.adoption_coefficient;
        }
    }
}

/// Noise object ready to be injected into the model kwargs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfiguredNoise {
    Param(AdaptiveParamNoiseSpec),
    Action(ActionNoise),
}

impl ConfiguredNoise {
    /// Constructor argument the noise is passed under.
    pub fn kwarg(&self) -> &'static str {
        match self {
            ConfiguredNoise::Param(_) => "param_noise",
            ConfiguredNoise::Action(_) => "action_noise",
        }
    }

    pub fn into_hyper_value(self) -> HyperValue {
        match self {
            ConfiguredNoise::Param(spec) => HyperValue::ParamNoise(spec),
            ConfiguredNoise::Action(noise) => HyperValue::ActionNoise(noise),
        }
    }
}

/// Build the noise selected by `params.noise_type` for the given action space.
pub fn configure_noise(
    params: &NoiseParams,
    action_space: &Space,
    settings: &NoiseSettings,
) -> Result<ConfiguredNoise, ConfigError> {
    let std = params.std;
    match NoiseKind::parse(&params.noise_type)? {
        NoiseKind::AdaptiveParam => Ok(ConfiguredNoise::Param(AdaptiveParamNoiseSpec::new(
            std,
            std,
            settings.param_noise_adoption_coefficient,
        ))),
        NoiseKind::Normal => Ok(ConfiguredNoise::Action(ActionNoise::normal(
            n_actions(action_space)?,
            std,
        ))),
        NoiseKind::OrnsteinUhlenbeck => Ok(ConfiguredNoise::Action(
            ActionNoise::ornstein_uhlenbeck(
                n_actions(action_space)?,
                std,
                settings.ou_theta,
                settings.ou_dt,
            ),
        )),
    }
}

fn n_actions(action_space: &Space) -> Result<usize, ConfigError> {
    match action_space {
        Space::Box { shape, .. } if !shape.is_empty() => Ok(shape[0]),
        _ => Err(ConfigError::NoiseOnDiscreteActions),
    }
}
