mod args;
mod trainer;

pub use args::TrainArgs;
pub use trainer::{run_cli, run_with_args, StartMode, Trainer};
