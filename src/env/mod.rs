//! Environment handles and the wrapper layers the composer stacks on top of
//! a backend-provided base environment.
//!
//! Layers own the handle they wrap (`Box<dyn VecEnv>`), so composition is
//! linear: base -> [`DummyVecEnv`] -> [`VecNormalize`] -> [`VecFrameStack`].

mod compose;
mod frame_stack;
mod normalize;

use crate::error::BackendError;

pub use compose::{ComposedEnv, EnvBackend, EnvComposer, EnvRequest, VisualEncoder};
pub use frame_stack::VecFrameStack;
pub use normalize::{NormalizeOptions, RunningMeanStd, VecNormalize, OBS_RMS_FILE, RET_RMS_FILE};

pub type Observation = Vec<f32>;
pub type Action = Vec<f32>;

/// Observation or action space.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Space {
    /// Continuous values in `[low, high]` with the given shape.
    Box {
        low: f32,
        high: f32,
        shape: Vec<usize>,
    },
    /// One of `n` discrete choices.
    Discrete(usize),
}

impl Space {
    pub fn shape(&self) -> &[usize] {
        match self {
            Space::Box { shape, .. } => shape,
            Space::Discrete(_) => &[],
        }
    }

    /// Number of scalars in one element of the space.
    pub fn flat_dim(&self) -> usize {
        match self {
            Space::Box { shape, .. } => shape.iter().product(),
            Space::Discrete(_) => 1,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Space::Box { .. })
    }
}

/// Result of one environment transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
}

/// A single simulation loop, provided by the backend.
pub trait Environment {
    fn observation_space(&self) -> &Space;
    fn action_space(&self) -> &Space;
    fn reset(&mut self) -> Result<Observation, BackendError>;
    fn step(&mut self, action: &Action) -> Result<Step, BackendError>;
}

/// Batched environment interface the model learns against.
pub trait VecEnv {
    fn num_envs(&self) -> usize;
    fn observation_space(&self) -> &Space;
    fn action_space(&self) -> &Space;
    fn reset(&mut self) -> Result<Vec<Observation>, BackendError>;
    fn step(&mut self, actions: &[Action]) -> Result<Vec<Step>, BackendError>;

    /// The handle this layer wraps, if it is a wrapper.
    fn wrapped(&self) -> Option<&dyn VecEnv> {
        None
    }

    fn wrapped_mut(&mut self) -> Option<&mut dyn VecEnv> {
        None
    }

    /// Running statistics live only on the normalization layer itself.
    fn as_normalizer(&self) -> Option<&VecNormalize> {
        None
    }

    fn as_normalizer_mut(&mut self) -> Option<&mut VecNormalize> {
        None
    }

    fn is_frame_stack(&self) -> bool {
        false
    }
}

/// Strip an outer frame-stack layer. Returns `None` only when a frame stack
/// claims to wrap nothing.
pub fn unwrap_frame_stack(env: &mut dyn VecEnv) -> Option<&mut dyn VecEnv> {
    if env.is_frame_stack() {
        env.wrapped_mut()
    } else {
        Some(env)
    }
}

/// Normalization layer directly beneath an optional frame stack.
pub fn normalizer_mut(env: &mut dyn VecEnv) -> Option<&mut VecNormalize> {
    unwrap_frame_stack(env).and_then(|inner| inner.as_normalizer_mut())
}

/// Adapts backend environments to [`VecEnv`], resetting each one when its
/// episode ends.
pub struct DummyVecEnv {
    envs: Vec<Box<dyn Environment>>,
    observation_space: Space,
    action_space: Space,
}

impl DummyVecEnv {
    pub fn new(env: Box<dyn Environment>) -> Self {
        let observation_space = env.observation_space().clone();
        let action_space = env.action_space().clone();
        DummyVecEnv {
            envs: vec![env],
            observation_space,
            action_space,
        }
    }

    /// Batch several environments; they must share spaces with the first.
    pub fn from_envs(envs: Vec<Box<dyn Environment>>) -> Result<Self, BackendError> {
        let first = envs
            .first()
            .ok_or("DummyVecEnv needs at least one environment")?;
        let observation_space = first.observation_space().clone();
        let action_space = first.action_space().clone();
        if envs.iter().any(|e| {
            e.observation_space() != &observation_space || e.action_space() != &action_space
        }) {
            return Err("all environments in a DummyVecEnv must share spaces".into());
        }
        Ok(DummyVecEnv {
            envs,
            observation_space,
            action_space,
        })
    }
}

impl VecEnv for DummyVecEnv {
    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Vec<Observation>, BackendError> {
        self.envs.iter_mut().map(|env| env.reset()).collect()
    }

    fn step(&mut self, actions: &[Action]) -> Result<Vec<Step>, BackendError> {
        if actions.len() != self.envs.len() {
            return Err(format!(
                "expected {} actions, got {}",
                self.envs.len(),
                actions.len()
            )
            .into());
        }
        let mut steps = Vec::with_capacity(self.envs.len());
        for (env, action) in self.envs.iter_mut().zip(actions) {
            let mut step = env.step(action)?;
            if step.done {
                step.observation = env.reset()?;
            }
            steps.push(step);
        }
        Ok(steps)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Counts steps; observation is `[t, t + 1, ...]`, episode ends every
    /// `horizon` steps, reward is always 1.
    pub struct CountingEnv {
        pub observation_space: Space,
        pub action_space: Space,
        pub horizon: usize,
        pub t: usize,
        pub resets: usize,
    }

    impl CountingEnv {
        pub fn new(obs_shape: Vec<usize>, horizon: usize) -> Self {
            CountingEnv {
                observation_space: Space::Box {
                    low: -100.0,
                    high: 100.0,
                    shape: obs_shape,
                },
                action_space: Space::Box {
                    low: -1.0,
                    high: 1.0,
                    shape: vec![2],
                },
                horizon,
                t: 0,
                resets: 0,
            }
        }

        fn observation(&self) -> Observation {
            (0..self.observation_space.flat_dim())
                .map(|i| (self.t + i) as f32)
                .collect()
        }
    }

    impl Environment for CountingEnv {
        fn observation_space(&self) -> &Space {
            &self.observation_space
        }

        fn action_space(&self) -> &Space {
            &self.action_space
        }

        fn reset(&mut self) -> Result<Observation, BackendError> {
            self.t = 0;
            self.resets += 1;
            Ok(self.observation())
        }

        fn step(&mut self, _action: &Action) -> Result<Step, BackendError> {
            self.t += 1;
            Ok(Step {
                observation: self.observation(),
                reward: 1.0,
                done: self.t >= self.horizon,
            })
        }
    }

    pub fn zero_actions(env: &dyn VecEnv) -> Vec<Action> {
        vec![vec![0.0; env.action_space().flat_dim()]; env.num_envs()]
    }
}
