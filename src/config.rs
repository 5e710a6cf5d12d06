use std::path::{Path, PathBuf};

use crate::algos::Algo;
use crate::error::ConfigError;

/// Top-level settings, loadable from TOML. Hyperparameters themselves live in
/// the per-algorithm YAML files under `paths.hyperparams_dir`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ZooConfig {
    pub paths: PathsConfig,
    pub normalization: NormalizationSettings,
    pub model: ModelSettings,
    pub noise: NoiseSettings,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub hyperparams_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            hyperparams_dir: PathBuf::from("hyperparams"),
        }
    }
}

/// What to do when normalization is requested for an algorithm that cannot use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedPolicy {
    /// Log a warning and train without normalization.
    Warn,
    /// Abort the run with a configuration error.
    Error,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub unsupported_algos: Vec<Algo>,
    pub on_unsupported: UnsupportedPolicy,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        NormalizationSettings {
            unsupported_algos: vec![Algo::Ddpg],
            on_unsupported: UnsupportedPolicy::Warn,
        }
    }
}

impl NormalizationSettings {
    pub fn supports(&self, algo: Algo) -> bool {
        !self.unsupported_algos.contains(&algo)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub verbose: u8,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings { verbose: 1 }
    }
}

/// Constants for the noise processes built by the noise configurator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    pub ou_theta: f64,
    pub ou_dt: f64,
    pub param_noise_adoption_coefficient: f64,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        NoiseSettings {
            ou_theta: 0.15,
            ou_dt: 1e-2,
            param_noise_adoption_coefficient: 1.01,
        }
    }
}

impl ZooConfig {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: ZooConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(
                "config file '{}' not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.hyperparams_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "paths.hyperparams_dir must not be empty".into(),
            ));
        }
        if self.noise.ou_theta <= 0.0 {
            return Err(ConfigError::Validation("noise.ou_theta must be > 0".into()));
        }
        if self.noise.ou_dt <= 0.0 {
            return Err(ConfigError::Validation("noise.ou_dt must be > 0".into()));
        }
        if self.noise.param_noise_adoption_coefficient <= 1.0 {
            return Err(ConfigError::Validation(
                "noise.param_noise_adoption_coefficient must be > 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&ZooConfig::default()).expect("default config serializes")
    }
}
