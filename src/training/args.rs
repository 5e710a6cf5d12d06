use std::path::PathBuf;

use clap::Parser;

use crate::algos::Algo;

/// Train an RL agent with hyperparameters from `hyperparams/<algo>.yml`.
#[derive(Debug, Clone, Parser)]
#[command(name = "train", about = "Train an RL agent from a hyperparameter file")]
pub struct TrainArgs {
    /// RL algorithm
    #[arg(short, long, value_enum, default_value_t = Algo::Ppo2)]
    pub algo: Algo,

    /// Environment identifier; selects the hyperparameter section and names the run
    #[arg(long, default_value = "DonkeyVae-v0")]
    pub env: String,

    /// Tensorboard log dir
    #[arg(long = "tensorboard-log", visible_alias = "tb", default_value = "")]
    pub tensorboard_log: String,

    /// Path to a pretrained agent (.pkl) to continue training
    #[arg(short = 'i', long)]
    pub trained_agent: Option<PathBuf>,

    /// Overwrite the number of timesteps (-1: use the hyperparameter file)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub n_timesteps: i64,

    /// Override log interval (-1: no change)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub log_interval: i64,

    /// Log folder
    #[arg(short = 'f', long, default_value = "logs")]
    pub log_folder: PathBuf,

    /// Path to a saved visual encoder
    #[arg(long, visible_alias = "vae")]
    pub vae_path: Option<PathBuf>,

    /// Save the visual encoder next to the model
    #[arg(long)]
    pub save_vae: bool,

    /// Random generator seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Path to TOML settings file
    #[arg(long, default_value = "zoo.toml")]
    pub config: PathBuf,
}

impl TrainArgs {
    /// Timestep count that replaces the configured one, if any.
    pub fn n_timesteps_override(&self) -> Option<u64> {
        u64::try_from(self.n_timesteps).ok().filter(|n| *n > 0)
    }

    pub fn log_interval_override(&self) -> Option<u32> {
        u32::try_from(self.log_interval).ok()
    }

    /// `<tensorboard-log>/<env>`, or `None` when no directory was given.
    pub fn tensorboard_dir(&self) -> Option<PathBuf> {
        if self.tensorboard_log.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.tensorboard_log).join(&self.env))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TrainArgs {
        TrainArgs::try_parse_from(std::iter::once("train").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.algo, Algo::Ppo2);
        assert_eq!(args.env, "DonkeyVae-v0");
        assert_eq!(args.log_folder, PathBuf::from("logs"));
        assert_eq!(args.seed, 0);
        assert!(args.trained_agent.is_none());
        assert!(args.vae_path.is_none());
        assert!(!args.save_vae);
        assert_eq!(args.n_timesteps_override(), None);
        assert_eq!(args.log_interval_override(), None);
        assert_eq!(args.tensorboard_dir(), None);
    }

    #[test]
    fn test_driving_script_invocation() {
        let args = parse(&[
            "--algo",
            "sac",
            "--vae-path",
            "logs_df01/vae-32.pkl",
            "-n",
            "128000",
            "--log-folder",
            "logs_df01/",
            "--tb",
            "1205_single_model_tensorboard/",
        ]);
        assert_eq!(args.algo, Algo::Sac);
        assert_eq!(args.vae_path, Some(PathBuf::from("logs_df01/vae-32.pkl")));
        assert_eq!(args.n_timesteps_override(), Some(128_000));
        assert_eq!(
            args.tensorboard_dir(),
            Some(PathBuf::from("1205_single_model_tensorboard/DonkeyVae-v0"))
        );
    }

    #[test]
    fn test_negative_and_zero_overrides_are_ignored() {
        let args = parse(&["-n", "-1", "--log-interval", "-1"]);
        assert_eq!(args.n_timesteps_override(), None);
        assert_eq!(args.log_interval_override(), None);

        let args = parse(&["-n", "0", "--log-interval", "0"]);
        assert_eq!(args.n_timesteps_override(), None);
        assert_eq!(args.log_interval_override(), Some(0));
    }

    #[test]
    fn test_rejects_unknown_algo() {
        assert!(TrainArgs::try_parse_from(["train", "--algo", "her"]).is_err());
    }
}
