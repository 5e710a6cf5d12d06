use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::algos::Algo;

/// Wrapper layers the model was trained behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvLayers {
    pub normalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_stack: Option<usize>,
    #[serde(default)]
    pub visual_encoder: bool,
}

/// Top-level run metadata written to run.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub algo: Algo,
    pub env_id: String,
    pub run_index: u32,
    pub seed: u64,
    pub n_timesteps: u64,
    pub timestamp: u64,
    pub layers: EnvLayers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<PathBuf>,
}

impl RunMetadata {
    pub fn new(algo: Algo, env_id: &str, run_index: u32, seed: u64, n_timesteps: u64) -> Self {
        RunMetadata {
            algo,
            env_id: env_id.to_string(),
            run_index,
            seed,
            n_timesteps,
            timestamp: unix_timestamp(),
            layers: EnvLayers {
                normalized: false,
                frame_stack: None,
                visual_encoder: false,
            },
            resumed_from: None,
        }
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
