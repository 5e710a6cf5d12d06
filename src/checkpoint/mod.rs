mod metadata;
mod run_dir;

pub use metadata::{EnvLayers, RunMetadata};
pub use run_dir::{
    latest_run_id, load_metadata, stats_dir_for_checkpoint, validate_trained_agent,
    RunDirectory, RunSummary, CONFIG_FILE, ENCODER_FILE, METADATA_FILE, MODEL_EXTENSION,
};
