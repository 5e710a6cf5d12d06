//! Per-algorithm hyperparameter files and the typed values handed to model
//! factories.
//!
//! A file `hyperparams/<algo>.yml` maps environment identifiers to a mapping
//! of constructor arguments plus a few control keys (`n_timesteps`,
//! `normalize`, `frame_stack`, `noise_type`, `noise_std`) that the driver
//! consumes itself.

mod schedule;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::algos::Algo;
use crate::env::NormalizeOptions;
use crate::error::ConfigError;
use crate::noise::{ActionNoise, AdaptiveParamNoiseSpec, NoiseParams};

pub use schedule::{Schedule, SCHEDULE_KEYS};

/// Keys the driver consumes; they never reach a model factory.
pub const CONTROL_KEYS: [&str; 5] = [
    "n_timesteps",
    "normalize",
    "frame_stack",
    "noise_type",
    "noise_std",
];

/// A constructor argument after load-time parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum HyperValue {
    Raw(Value),
    Schedule(Schedule),
    ActionNoise(ActionNoise),
    ParamNoise(AdaptiveParamNoiseSpec),
}

impl HyperValue {
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            HyperValue::Raw(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_schedule(&self) -> Option<&Schedule> {
        match self {
            HyperValue::Schedule(s) => Some(s),
            _ => None,
        }
    }
}

/// Constructor arguments passed to an [`AlgorithmFactory`](crate::algos::AlgorithmFactory).
pub type ModelKwargs = BTreeMap<String, HyperValue>;

/// Control keys extracted from the hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlKeys {
    pub n_timesteps: u64,
    pub normalize: Option<NormalizeOptions>,
    pub frame_stack: Option<usize>,
    pub noise: Option<NoiseParams>,
}

/// The hyperparameter section for one algorithm and environment.
#[derive(Debug, Clone)]
pub struct HyperparameterSet {
    env_id: String,
    source: PathBuf,
    values: BTreeMap<String, Value>,
}

impl HyperparameterSet {
    /// Path of the hyperparameter file for `algo` under `dir`.
    pub fn path_for(dir: &Path, algo: Algo) -> PathBuf {
        dir.join(format!("{algo}.yml"))
    }

    /// Load `<dir>/<algo>.yml` and select the section for `env_id`.
    pub fn load(dir: &Path, algo: Algo, env_id: &str) -> Result<Self, ConfigError> {
        let path = Self::path_for(dir, algo);
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::HyperparamsRead {
            path: path.clone(),
            source: e,
        })?;
        Self::from_yaml_str(&content, env_id, &path)
    }

    pub fn from_yaml_str(yaml: &str, env_id: &str, source: &Path) -> Result<Self, ConfigError> {
        let doc: Value = serde_yaml::from_str(yaml).map_err(|e| ConfigError::HyperparamsParse {
            path: source.to_path_buf(),
            source: e,
        })?;
        let section = doc.get(env_id).ok_or_else(|| ConfigError::MissingSection {
            env: env_id.to_string(),
            path: source.to_path_buf(),
        })?;
        let mapping = section
            .as_mapping()
            .ok_or_else(|| ConfigError::SectionNotMapping(env_id.to_string()))?;

        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let key = key.as_str().ok_or_else(|| ConfigError::InvalidValue {
                key: describe(key),
                value: "hyperparameter names must be strings".into(),
            })?;
            values.insert(key.to_string(), value.clone());
        }

        Ok(HyperparameterSet {
            env_id: env_id.to_string(),
            source: source.to_path_buf(),
            values,
        })
    }

    pub fn env_id(&self) -> &str {
        &self.env_id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Sorted copy of the values as loaded, for logging and `config.yml`.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    /// Remove the control keys and return their parsed values.
    /// `n_timesteps_override` wins over the file's `n_timesteps`.
    pub fn take_controls(
        &mut self,
        n_timesteps_override: Option<u64>,
    ) -> Result<ControlKeys, ConfigError> {
        let configured = self.values.remove("n_timesteps");
        let n_timesteps = match (n_timesteps_override, configured) {
            (Some(n), _) => n,
            (None, Some(value)) => parse_timesteps(&value)?,
            (None, None) => return Err(ConfigError::MissingTimesteps),
        };

        let normalize = match self.values.remove("normalize") {
            Some(value) => parse_normalize(&value)?,
            None => None,
        };

        let frame_stack = match self.values.remove("frame_stack") {
            Some(value) => parse_frame_stack(&value)?,
            None => None,
        };

        let noise_type = self.values.remove("noise_type");
        let noise_std = self.values.remove("noise_std");
        let noise = match noise_type {
            None | Some(Value::Null) => None,
            Some(Value::String(noise_type)) => {
                let std = noise_std
                    .as_ref()
                    .and_then(as_number)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "noise_std".into(),
                        value: noise_std.as_ref().map_or("missing".into(), describe),
                    })?;
                Some(NoiseParams { noise_type, std })
            }
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "noise_type".into(),
                    value: describe(&other),
                })
            }
        };

        Ok(ControlKeys {
            n_timesteps,
            normalize,
            frame_stack,
            noise,
        })
    }

    /// Convert what remains into constructor arguments, parsing schedule keys.
    pub fn into_kwargs(self) -> Result<ModelKwargs, ConfigError> {
        let mut kwargs = ModelKwargs::new();
        for (key, value) in self.values {
            let parsed = if SCHEDULE_KEYS.contains(&key.as_str()) {
                HyperValue::Schedule(Schedule::parse(&key, &value)?)
            } else {
                HyperValue::Raw(value)
            };
            kwargs.insert(key, parsed);
        }
        Ok(kwargs)
    }
}

/// Render a YAML value on one line for error messages.
pub(crate) fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().replace('\n', " "))
        .unwrap_or_else(|_| format!("{value:?}"))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Tagged(tagged) => as_number(&tagged.value),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timesteps(value: &Value) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "n_timesteps".into(),
        value: describe(value),
    };
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    match as_number(value) {
        Some(n) if n >= 0.0 && n.is_finite() => Ok(n as u64),
        _ => Err(invalid()),
    }
}

fn parse_normalize(value: &Value) -> Result<Option<NormalizeOptions>, ConfigError> {
    let invalid = |detail: String| ConfigError::InvalidValue {
        key: "normalize".into(),
        value: detail,
    };
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(NormalizeOptions::default())),
        Value::Mapping(_) => serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|e| invalid(format!("{}: {e}", describe(value)))),
        Value::String(s) => serde_yaml::from_str(s)
            .map(Some)
            .map_err(|e| invalid(format!("{s}: {e}"))),
        other => Err(invalid(describe(other))),
    }
}

fn parse_frame_stack(value: &Value) -> Result<Option<usize>, ConfigError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(None),
            Some(n) => Ok(Some(n as usize)),
            None => Err(ConfigError::InvalidValue {
                key: "frame_stack".into(),
                value: n.to_string(),
            }),
        },
        other => Err(ConfigError::InvalidValue {
            key: "frame_stack".into(),
            value: describe(other),
        }),
    }
}
