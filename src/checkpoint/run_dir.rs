use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::algos::{Algo, Model};
use crate::checkpoint::metadata::RunMetadata;
use crate::env::{VecNormalize, VisualEncoder};
use crate::error::CheckpointError;

/// Extension of saved model files.
pub const MODEL_EXTENSION: &str = "pkl";
pub const CONFIG_FILE: &str = "config.yml";
pub const ENCODER_FILE: &str = "vae.json";
pub const METADATA_FILE: &str = "run.json";

/// A checkpoint to resume from must be an existing `.pkl` file.
pub fn validate_trained_agent(path: &Path) -> Result<(), CheckpointError> {
    let has_extension = path.extension().is_some_and(|ext| ext == MODEL_EXTENSION);
    if has_extension && path.is_file() {
        Ok(())
    } else {
        Err(CheckpointError::InvalidTrainedAgent(path.to_path_buf()))
    }
}

/// Directory holding the normalization statistics saved next to a model:
/// the model path without its `.pkl` extension.
pub fn stats_dir_for_checkpoint(model_path: &Path) -> PathBuf {
    if path_has_model_extension(model_path) {
        model_path.with_extension("")
    } else {
        model_path.to_path_buf()
    }
}

fn path_has_model_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == MODEL_EXTENSION)
}

/// Highest `N` among entries of `log_path` named `<env_id>_<N>`, or 0.
pub fn latest_run_id(log_path: &Path, env_id: &str) -> Result<u32, CheckpointError> {
    let entries = match fs::read_dir(log_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(CheckpointError::ListRuns {
                path: log_path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut latest = 0;
    for entry in entries {
        let entry = entry.map_err(|e| CheckpointError::ListRuns {
            path: log_path.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(id) = parse_run_id(name, env_id) {
            let id = id.map_err(|_| CheckpointError::RunIndexOverflow {
                path: entry.path(),
            })?;
            latest = latest.max(id);
        }
    }
    Ok(latest)
}

/// `None` when `name` is not a run of `env_id`; an error when its index
/// is all digits but too large.
fn parse_run_id(name: &str, env_id: &str) -> Option<Result<u32, ParseIntError>> {
    let (prefix, suffix) = name.rsplit_once('_')?;
    if prefix != env_id || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(suffix.parse())
}

/// What a finished run left on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub run_index: u32,
    pub model_path: PathBuf,
    pub params_dir: PathBuf,
    pub timesteps: u64,
}

/// A numbered run directory `<log>/<algo>/<env>_<N>/` and its artifacts.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    env_id: String,
    run_index: u32,
    run_dir: PathBuf,
    params_dir: PathBuf,
}

impl RunDirectory {
    /// Pick the next free run index and create `<run>/<env>/`.
    pub fn allocate(log_folder: &Path, algo: Algo, env_id: &str) -> Result<Self, CheckpointError> {
        let log_path = log_folder.join(algo.as_str());
        let latest = latest_run_id(&log_path, env_id)?;
        let run_dir_for = |index: u32| log_path.join(format!("{env_id}_{index}"));
        let run_index = latest
            .checked_add(1)
            .ok_or_else(|| CheckpointError::RunIndexOverflow {
                path: run_dir_for(latest),
            })?;
        let run_dir = run_dir_for(run_index);
        let params_dir = run_dir.join(env_id);

        fs::create_dir_all(&params_dir).map_err(|e| CheckpointError::CreateDir {
            path: params_dir.clone(),
            source: e,
        })?;

        Ok(RunDirectory {
            env_id: env_id.to_string(),
            run_index,
            run_dir,
            params_dir,
        })
    }

    pub fn run_index(&self) -> u32 {
        self.run_index
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory for the config snapshot, encoder and statistics.
    pub fn params_dir(&self) -> &Path {
        &self.params_dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.run_dir
            .join(format!("{}.{MODEL_EXTENSION}", self.env_id))
    }

    pub fn save_model(&self, model: &dyn Model) -> Result<PathBuf, CheckpointError> {
        let path = self.model_path();
        model
            .save(&path)
            .map_err(|source| CheckpointError::ModelSave {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Write the hyperparameters, sorted by key, to `config.yml`.
    pub fn save_config(&self, snapshot: &BTreeMap<String, Value>) -> Result<PathBuf, CheckpointError> {
        let path = self.params_dir.join(CONFIG_FILE);
        let yaml = serde_yaml::to_string(snapshot)?;
        write_file(&path, yaml)?;
        Ok(path)
    }

    pub fn save_encoder(&self, encoder: &dyn VisualEncoder) -> Result<PathBuf, CheckpointError> {
        let path = self.params_dir.join(ENCODER_FILE);
        encoder
            .save(&path)
            .map_err(|source| CheckpointError::EncoderSave {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    pub fn save_running_average(&self, normalizer: &VecNormalize) -> Result<(), CheckpointError> {
        normalizer.save_running_average(&self.params_dir)
    }

    pub fn save_metadata(&self, metadata: &RunMetadata) -> Result<PathBuf, CheckpointError> {
        let path = self.params_dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(metadata)?;
        write_file(&path, json)?;
        Ok(path)
    }

    pub fn summary(&self, timesteps: u64) -> RunSummary {
        RunSummary {
            run_dir: self.run_dir.clone(),
            run_index: self.run_index,
            model_path: self.model_path(),
            params_dir: self.params_dir.clone(),
            timesteps,
        }
    }
}

/// Read `run.json` from a params directory.
pub fn load_metadata(params_dir: &Path) -> Result<RunMetadata, CheckpointError> {
    let path = params_dir.join(METADATA_FILE);
    let json = fs::read_to_string(&path).map_err(|e| CheckpointError::MetadataRead {
        path: path.clone(),
        source: e,
    })?;
    serde_json::from_str(&json).map_err(|e| CheckpointError::MetadataParse { path, source: e })
}

fn write_file(path: &Path, contents: String) -> Result<(), CheckpointError> {
    fs::write(path, contents).map_err(|source| CheckpointError::Write {
        path: path.to_path_buf(),
        source,
    })
}
