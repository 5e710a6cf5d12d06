use std::collections::BTreeMap;
use std::path::Path;

use crate::algos::{Algo, Model, ModelContext};
use crate::error::{BackendError, TrainingError};
use crate::hyperparams::ModelKwargs;

/// Constructs models for one algorithm. Implemented by the RL backend.
pub trait AlgorithmFactory {
    /// Build a fresh model from the full hyperparameter mapping.
    fn create(&self, ctx: &ModelContext, kwargs: ModelKwargs)
        -> Result<Box<dyn Model>, BackendError>;

    /// Load a saved model and bind it to the environment described by `ctx`.
    fn load(
        &self,
        path: &Path,
        ctx: &ModelContext,
        kwargs: ModelKwargs,
    ) -> Result<Box<dyn Model>, BackendError>;
}

/// Maps each [`Algo`] to the factory that builds it.
#[derive(Default)]
pub struct AlgorithmRegistry {
    factories: BTreeMap<Algo, Box<dyn AlgorithmFactory>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `algo`.
    pub fn register<F>(&mut self, algo: Algo, factory: F) -> &mut Self
    where
        F: AlgorithmFactory + 'static,
    {
        self.factories.insert(algo, Box::new(factory));
        self
    }

    pub fn get(&self, algo: Algo) -> Result<&dyn AlgorithmFactory, TrainingError> {
        self.factories
            .get(&algo)
            .map(|f| f.as_ref())
            .ok_or(TrainingError::UnknownAlgorithm(algo))
    }

    pub fn contains(&self, algo: Algo) -> bool {
        self.factories.contains_key(&algo)
    }

    /// Registered algorithms in key order.
    pub fn algorithms(&self) -> Vec<Algo> {
        self.factories.keys().copied().collect()
    }
}
