use crate::env::{Action, Observation, Space, Step, VecEnv};
use crate::error::{BackendError, ConfigError};

/// Stacks the last `n_stack` observations along the last axis.
///
/// An observation of shape `[.., C]` becomes `[.., C * n_stack]`, oldest
/// frame first. Frames from a previous episode are zeroed.
pub struct VecFrameStack {
    venv: Box<dyn VecEnv>,
    n_stack: usize,
    channels: usize,
    observation_space: Space,
    stacked: Vec<Observation>,
}

impl VecFrameStack {
    pub fn new(venv: Box<dyn VecEnv>, n_stack: usize) -> Result<Self, ConfigError> {
        if n_stack == 0 {
            return Err(ConfigError::InvalidValue {
                key: "frame_stack".into(),
                value: "0".into(),
            });
        }
        let (low, high, shape) = match venv.observation_space() {
            Space::Box { low, high, shape } if !shape.is_empty() => (*low, *high, shape.clone()),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "frame_stack".into(),
                    value: format!("cannot stack observations from {other:?}"),
                })
            }
        };
        let channels = shape[shape.len() - 1];
        let mut stacked_shape = shape;
        if let Some(last) = stacked_shape.last_mut() {
            *last *= n_stack;
        }
        let observation_space = Space::Box {
            low,
            high,
            shape: stacked_shape,
        };
        let stacked = vec![vec![0.0; observation_space.flat_dim()]; venv.num_envs()];
        Ok(VecFrameStack {
            venv,
            n_stack,
            channels,
            observation_space,
            stacked,
        })
    }

    fn check_frame(&self, env_idx: usize, obs: &[f32]) -> Result<(), BackendError> {
        let expected = self.venv.observation_space().flat_dim();
        if env_idx >= self.stacked.len() || obs.len() != expected {
            return Err(format!(
                "cannot stack observation {env_idx} of length {}: expected {expected} values for {} envs",
                obs.len(),
                self.stacked.len()
            )
            .into());
        }
        Ok(())
    }

    fn push_frame(&mut self, env_idx: usize, obs: &[f32]) {
        let width = self.channels * self.n_stack;
        let newest = (self.n_stack - 1) * self.channels;
        let stacked = &mut self.stacked[env_idx];
        for (row, frame) in stacked.chunks_mut(width).zip(obs.chunks(self.channels)) {
            row.rotate_left(self.channels);
            row[newest..].copy_from_slice(frame);
        }
    }
}

impl VecEnv for VecFrameStack {
    fn num_envs(&self) -> usize {
        self.venv.num_envs()
    }

    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn action_space(&self) -> &Space {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, BackendError> {
        let observations = self.venv.reset()?;
        for (i, obs) in observations.iter().enumerate() {
            self.check_frame(i, obs)?;
            self.stacked[i].iter_mut().for_each(|x| *x = 0.0);
            self.push_frame(i, obs);
        }
        Ok(self.stacked.clone())
    }

    fn step(&mut self, actions: &[Action]) -> Result<Vec<Step>, BackendError> {
        let steps = self.venv.step(actions)?;
        let mut stacked_steps = Vec::with_capacity(steps.len());
        for (i, step) in steps.into_iter().enumerate() {
            self.check_frame(i, &step.observation)?;
            if step.done {
                self.stacked[i].iter_mut().for_each(|x| *x = 0.0);
            }
            self.push_frame(i, &step.observation);
            stacked_steps.push(Step {
                observation: self.stacked[i].clone(),
                reward: step.reward,
                done: step.done,
            });
        }
        Ok(stacked_steps)
    }

    fn wrapped(&self) -> Option<&dyn VecEnv> {
        Some(self.venv.as_ref())
    }

    fn wrapped_mut(&mut self) -> Option<&mut dyn VecEnv> {
        Some(self.venv.as_mut())
    }

    fn is_frame_stack(&self) -> bool {
        true
    }
}
