use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use clap::Parser;

use drive_zoo::algos::{Algo, AlgorithmFactory, AlgorithmRegistry, Model, ModelContext};
use drive_zoo::checkpoint::{load_metadata, RunSummary};
use drive_zoo::config::ZooConfig;
use drive_zoo::env::{
    normalizer_mut, Action, EnvBackend, Environment, Observation, RunningMeanStd, Space, Step,
    VecEnv, VisualEncoder, OBS_RMS_FILE,
};
use drive_zoo::error::{BackendError, CheckpointError, ConfigError, TrainingError};
use drive_zoo::hyperparams::{HyperValue, ModelKwargs, Schedule};
use drive_zoo::noise::ActionNoise;
use drive_zoo::training::{run_with_args, TrainArgs, Trainer};

const SAC_YML: &str = r#"
Env-v0:
  policy: 'MlpPolicy'
  n_timesteps: 20
  learning_rate: !!float 3e-4
  batch_size: 8
  normalize: "{'norm_obs': True, 'norm_reward': False}"
  frame_stack: 2

Plain-v0:
  policy: 'MlpPolicy'
  n_timesteps: 12
  learning_rate: linear_0.001
"#;

const DDPG_YML: &str = r#"
Env-v0:
  policy: 'MlpPolicy'
  n_timesteps: 10
  noise_type: 'normal'
  noise_std: 0.2
  normalize: true
"#;

/// Observation `[t, t, t]`, episodes of ten steps.
struct RampEnv {
    observation_space: Space,
    action_space: Space,
    t: usize,
}

impl RampEnv {
    fn new() -> Self {
        RampEnv {
            observation_space: Space::Box {
                low: 0.0,
                high: 100.0,
                shape: vec![3],
            },
            action_space: Space::Box {
                low: -1.0,
                high: 1.0,
                shape: vec![2],
            },
            t: 0,
        }
    }
}

impl Environment for RampEnv {
    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Observation, BackendError> {
        self.t = 0;
        Ok(vec![0.0; 3])
    }

    fn step(&mut self, _action: &Action) -> Result<Step, BackendError> {
        self.t += 1;
        Ok(Step {
            observation: vec![self.t as f32; 3],
            reward: 1.0,
            done: self.t >= 10,
        })
    }
}

struct FakeEncoder;

impl VisualEncoder for FakeEncoder {
    fn z_size(&self) -> usize {
        32
    }

    fn save(&self, path: &Path) -> Result<(), BackendError> {
        fs::write(path, "{\"z_size\": 32}")?;
        Ok(())
    }
}

#[derive(Default)]
struct FakeBackend {
    seeds: RefCell<Vec<u64>>,
    encoder_loads: RefCell<Vec<PathBuf>>,
}

impl EnvBackend for FakeBackend {
    fn make_env(
        &self,
        seed: u64,
        _encoder: Option<Arc<dyn VisualEncoder>>,
    ) -> Result<Box<dyn Environment>, BackendError> {
        self.seeds.borrow_mut().push(seed);
        Ok(Box::new(RampEnv::new()))
    }

    fn load_encoder(&self, path: &Path) -> Result<Arc<dyn VisualEncoder>, BackendError> {
        self.encoder_loads.borrow_mut().push(path.to_path_buf());
        Ok(Arc::new(FakeEncoder))
    }
}

#[derive(Debug, Clone)]
enum Call {
    Create(ModelKwargs),
    Load(PathBuf, ModelKwargs),
    Learn {
        timesteps: u64,
        log_interval: Option<u32>,
        obs_shape: Vec<usize>,
        stats_count: Option<f64>,
    },
}

type CallLog = Rc<RefCell<Vec<Call>>>;

struct FakeModel {
    calls: CallLog,
}

impl Model for FakeModel {
    fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        total_timesteps: u64,
        log_interval: Option<u32>,
    ) -> Result<(), BackendError> {
        let obs_shape = env.observation_space().shape().to_vec();
        let stats_count = normalizer_mut(env).map(|n| n.obs_rms().count);
        self.calls.borrow_mut().push(Call::Learn {
            timesteps: total_timesteps,
            log_interval,
            obs_shape,
            stats_count,
        });

        env.reset()?;
        let actions = vec![vec![0.0; 2]; env.num_envs()];
        for _ in 0..total_timesteps {
            env.step(&actions)?;
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), BackendError> {
        fs::write(path, b"weights")?;
        Ok(())
    }
}

struct RecordingFactory {
    calls: CallLog,
}

impl AlgorithmFactory for RecordingFactory {
    fn create(
        &self,
        _ctx: &ModelContext,
        kwargs: ModelKwargs,
    ) -> Result<Box<dyn Model>, BackendError> {
        self.calls.borrow_mut().push(Call::Create(kwargs));
        Ok(Box::new(FakeModel {
            calls: Rc::clone(&self.calls),
        }))
    }

    fn load(
        &self,
        path: &Path,
        _ctx: &ModelContext,
        kwargs: ModelKwargs,
    ) -> Result<Box<dyn Model>, BackendError> {
        if !path.is_file() {
            return Err(format!("no model at {}", path.display()).into());
        }
        self.calls
            .borrow_mut()
            .push(Call::Load(path.to_path_buf(), kwargs));
        Ok(Box::new(FakeModel {
            calls: Rc::clone(&self.calls),
        }))
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    calls: CallLog,
    registry: AlgorithmRegistry,
    backend: FakeBackend,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let hyperparams = dir.path().join("hyperparams");
        fs::create_dir(&hyperparams).unwrap();
        fs::write(hyperparams.join("sac.yml"), SAC_YML).unwrap();
        fs::write(hyperparams.join("ddpg.yml"), DDPG_YML).unwrap();

        let calls: CallLog = Rc::default();
        let mut registry = AlgorithmRegistry::new();
        for algo in [Algo::Sac, Algo::Ddpg] {
            registry.register(
                algo,
                RecordingFactory {
                    calls: Rc::clone(&calls),
                },
            );
        }

        Fixture {
            dir,
            calls,
            registry,
            backend: FakeBackend::default(),
        }
    }

    fn log_folder(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    fn config(&self) -> ZooConfig {
        let mut config = ZooConfig::default();
        config.paths.hyperparams_dir = self.dir.path().join("hyperparams");
        config
    }

    fn args(&self, extra: &[&str]) -> TrainArgs {
        let log_folder = self.log_folder();
        let mut argv = vec![
            "train".to_string(),
            "--log-folder".to_string(),
            log_folder.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        TrainArgs::try_parse_from(argv).unwrap()
    }

    fn run(&self, extra: &[&str]) -> Result<RunSummary, TrainingError> {
        Trainer::new(self.args(extra), self.config()).run(&self.registry, &self.backend)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

fn read_rms(path: &Path) -> RunningMeanStd {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_fresh_run_saves_all_artifacts() {
    let fx = Fixture::new();
    let summary = fx.run(&["--algo", "sac", "--env", "Env-v0", "--seed", "7"]).unwrap();

    let run_dir = fx.log_folder().join("sac").join("Env-v0_1");
    assert_eq!(summary.run_dir, run_dir);
    assert_eq!(summary.run_index, 1);
    assert_eq!(summary.timesteps, 20);
    assert!(run_dir.join("Env-v0.pkl").is_file());

    let params = run_dir.join("Env-v0");
    let config = fs::read_to_string(params.join("config.yml")).unwrap();
    assert!(config.contains("n_timesteps"));
    assert!(config.contains("frame_stack"));
    assert!(params.join(OBS_RMS_FILE).is_file());
    assert!(!params.join("vae.json").exists());

    let meta = load_metadata(&params).unwrap();
    assert_eq!(meta.algo, Algo::Sac);
    assert_eq!(meta.seed, 7);
    assert!(meta.layers.normalized);
    assert_eq!(meta.layers.frame_stack, Some(2));
    assert!(meta.resumed_from.is_none());

    assert_eq!(fx.backend.seeds.borrow().as_slice(), &[7]);
}

#[test]
fn test_control_keys_never_reach_factory() {
    let fx = Fixture::new();
    fx.run(&["--algo", "sac", "--env", "Env-v0"]).unwrap();

    let calls = fx.calls();
    let Call::Create(kwargs) = &calls[0] else {
        panic!("expected a fresh model, got {:?}", calls[0]);
    };
    for key in ["n_timesteps", "normalize", "frame_stack", "noise_type", "noise_std"] {
        assert!(!kwargs.contains_key(key), "{key} reached the factory");
    }
    assert!(kwargs.contains_key("policy"));
    assert_eq!(
        kwargs["learning_rate"].as_schedule(),
        Some(&Schedule::Constant(3e-4))
    );

    match &calls[1] {
        Call::Learn {
            timesteps,
            log_interval,
            obs_shape,
            ..
        } => {
            assert_eq!(*timesteps, 20);
            assert_eq!(*log_interval, None);
            assert_eq!(obs_shape, &vec![6]);
        }
        other => panic!("expected learn, got {other:?}"),
    }
}

#[test]
fn test_overrides_and_linear_schedule() {
    let fx = Fixture::new();
    let summary = fx
        .run(&[
            "--algo",
            "sac",
            "--env",
            "Plain-v0",
            "-n",
            "5",
            "--log-interval",
            "3",
        ])
        .unwrap();
    assert_eq!(summary.timesteps, 5);

    let calls = fx.calls();
    let Call::Create(kwargs) = &calls[0] else {
        panic!("expected a fresh model");
    };
    let schedule = kwargs["learning_rate"].as_schedule().unwrap();
    assert_eq!(schedule.value(1.0), 0.001);
    assert_eq!(schedule.value(0.0), 0.0);

    assert!(matches!(
        calls[1],
        Call::Learn {
            timesteps: 5,
            log_interval: Some(3),
            stats_count: None,
            ..
        }
    ));
    assert!(!summary.params_dir.join(OBS_RMS_FILE).exists());
}

#[test]
fn test_run_indices_increase() {
    let fx = Fixture::new();
    let first = fx.run(&["--algo", "sac", "--env", "Plain-v0"]).unwrap();
    let second = fx.run(&["--algo", "sac", "--env", "Plain-v0"]).unwrap();
    assert_eq!(first.run_index, 1);
    assert_eq!(second.run_index, 2);
    assert!(fx.log_folder().join("sac/Plain-v0_2/Plain-v0.pkl").is_file());
}

#[test]
fn test_resume_loads_stats_from_checkpoint_path() {
    let fx = Fixture::new();
    let first = fx.run(&["--algo", "sac", "--env", "Env-v0"]).unwrap();
    let saved = read_rms(&first.params_dir.join(OBS_RMS_FILE));
    assert!(saved.count > 1.0);

    let model = first.model_path.display().to_string();
    let second = fx
        .run(&["--algo", "sac", "--env", "Env-v0", "-i", &model])
        .unwrap();
    assert_eq!(second.run_index, 2);

    let calls = fx.calls();
    let (path, kwargs) = calls
        .iter()
        .find_map(|c| match c {
            Call::Load(path, kwargs) => Some((path.clone(), kwargs.clone())),
            _ => None,
        })
        .expect("resume should load the model");
    assert_eq!(path, first.model_path);
    assert!(!kwargs.contains_key("policy"));
    assert!(kwargs.contains_key("batch_size"));

    // The second learn call sees the statistics restored beneath the frame stack.
    let stats_counts: Vec<Option<f64>> = calls
        .iter()
        .filter_map(|c| match c {
            Call::Learn { stats_count, .. } => Some(*stats_count),
            _ => None,
        })
        .collect();
    assert_eq!(stats_counts.len(), 2);
    assert!((stats_counts[1].unwrap() - saved.count).abs() < 1e-9);

    let meta = load_metadata(&second.params_dir).unwrap();
    assert_eq!(meta.resumed_from, Some(first.model_path.clone()));
}

#[test]
fn test_resume_requires_pkl_file() {
    let fx = Fixture::new();
    let bogus = fx.dir.path().join("agent.zip");
    fs::write(&bogus, b"x").unwrap();

    let err = fx
        .run(&["--algo", "sac", "--env", "Env-v0", "-i", &bogus.display().to_string()])
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::Checkpoint(CheckpointError::InvalidTrainedAgent(_))
    ));
    assert!(!fx.log_folder().exists());
}

#[test]
fn test_ddpg_gets_noise_and_skips_normalization() {
    let fx = Fixture::new();
    let summary = fx.run(&["--algo", "ddpg", "--env", "Env-v0"]).unwrap();

    let calls = fx.calls();
    let Call::Create(kwargs) = &calls[0] else {
        panic!("expected a fresh model");
    };
    match &kwargs["action_noise"] {
        HyperValue::ActionNoise(noise @ ActionNoise::Normal { .. }) => {
            assert_eq!(noise.mean(), &[0.0, 0.0]);
            assert_eq!(noise.sigma(), &[0.2, 0.2]);
        }
        other => panic!("expected normal action noise, got {other:?}"),
    }
    assert!(!kwargs.contains_key("noise_type"));
    assert!(!kwargs.contains_key("noise_std"));

    let meta = load_metadata(&summary.params_dir).unwrap();
    assert!(!meta.layers.normalized);
    assert!(!summary.params_dir.join(OBS_RMS_FILE).exists());
}

#[test]
fn test_ddpg_normalization_can_be_fatal() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.normalization.on_unsupported = drive_zoo::config::UnsupportedPolicy::Error;

    let err = Trainer::new(fx.args(&["--algo", "ddpg", "--env", "Env-v0"]), config)
        .run(&fx.registry, &fx.backend)
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::Config(ConfigError::NormalizationUnsupported(Algo::Ddpg))
    ));
    assert!(!fx.log_folder().exists());
}

#[test]
fn test_encoder_is_loaded_and_saved() {
    let fx = Fixture::new();
    let summary = fx
        .run(&[
            "--algo",
            "sac",
            "--env",
            "Plain-v0",
            "--vae-path",
            "logs_df01/vae-32.pkl",
            "--save-vae",
        ])
        .unwrap();

    assert_eq!(
        fx.backend.encoder_loads.borrow().as_slice(),
        &[PathBuf::from("logs_df01/vae-32.pkl")]
    );
    assert!(summary.params_dir.join("vae.json").is_file());
    assert!(load_metadata(&summary.params_dir).unwrap().layers.visual_encoder);
}

#[test]
fn test_missing_section_writes_nothing() {
    let fx = Fixture::new();
    let err = fx.run(&["--algo", "sac", "--env", "Unknown-v0"]).unwrap_err();
    assert!(matches!(
        err,
        TrainingError::Config(ConfigError::MissingSection { .. })
    ));
    assert!(fx.calls().is_empty());
    assert!(!fx.log_folder().exists());
}

#[test]
fn test_unregistered_algorithm() {
    let fx = Fixture::new();
    let err = fx.run(&["--algo", "ppo2", "--env", "Env-v0"]).unwrap_err();
    assert!(matches!(err, TrainingError::UnknownAlgorithm(Algo::Ppo2)));
}

#[test]
fn test_settings_file_is_read_from_config_flag() {
    let fx = Fixture::new();
    let settings = fx.dir.path().join("zoo.toml");
    let hyperparams = fx.dir.path().join("hyperparams");
    fs::write(
        &settings,
        format!("[paths]\nhyperparams_dir = {:?}\n", hyperparams.display().to_string()),
    )
    .unwrap();

    let config_flag = settings.display().to_string();
    let args = fx.args(&["--algo", "sac", "--env", "Env-v0", "--config", &config_flag]);
    let summary = run_with_args(args, &fx.registry, &fx.backend).unwrap();
    assert_eq!(summary.run_index, 1);
    assert!(summary.model_path.is_file());

    let missing = fx.dir.path().join("no-such-hyperparams");
    fs::write(
        &settings,
        format!("[paths]\nhyperparams_dir = {:?}\n", missing.display().to_string()),
    )
    .unwrap();
    let args = fx.args(&["--algo", "sac", "--env", "Env-v0", "--config", &config_flag]);
    assert!(run_with_args(args, &fx.registry, &fx.backend).is_err());
}
