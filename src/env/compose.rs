use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::algos::Algo;
use crate::config::{NormalizationSettings, UnsupportedPolicy};
use crate::env::{DummyVecEnv, Environment, NormalizeOptions, VecEnv, VecFrameStack, VecNormalize};
use crate::error::{BackendError, ConfigError, TrainingError};

/// Pretrained visual encoder the base environment compresses frames with.
pub trait VisualEncoder {
    /// Size of the latent vector the encoder produces.
    fn z_size(&self) -> usize;
    fn save(&self, path: &Path) -> Result<(), BackendError>;
}

/// Environment side of the RL backend.
pub trait EnvBackend {
    /// Build one base environment, seeded deterministically.
    fn make_env(
        &self,
        seed: u64,
        encoder: Option<Arc<dyn VisualEncoder>>,
    ) -> Result<Box<dyn Environment>, BackendError>;

    fn load_encoder(&self, path: &Path) -> Result<Arc<dyn VisualEncoder>, BackendError>;
}

/// What the composer should build.
pub struct EnvRequest {
    pub algo: Algo,
    pub seed: u64,
    pub encoder: Option<Arc<dyn VisualEncoder>>,
    pub normalize: Option<NormalizeOptions>,
    pub frame_stack: Option<usize>,
}

/// The outermost handle plus which layers it carries.
pub struct ComposedEnv {
    pub env: Box<dyn VecEnv>,
    pub normalized: bool,
    pub n_stack: Option<usize>,
}

pub struct EnvComposer<'a> {
    normalization: &'a NormalizationSettings,
}

impl<'a> EnvComposer<'a> {
    pub fn new(normalization: &'a NormalizationSettings) -> Self {
        EnvComposer { normalization }
    }

    pub fn compose(
        &self,
        backend: &dyn EnvBackend,
        request: EnvRequest,
    ) -> Result<ComposedEnv, TrainingError> {
        let base = backend
            .make_env(request.seed, request.encoder)
            .map_err(TrainingError::Env)?;
        let mut env: Box<dyn VecEnv> = Box::new(DummyVecEnv::new(base));

        let mut normalized = false;
        if let Some(options) = request.normalize {
            if self.normalization.supports(request.algo) {
                info!("Normalizing input and return");
                env = Box::new(VecNormalize::new(env, options));
                normalized = true;
            } else {
                match self.normalization.on_unsupported {
                    UnsupportedPolicy::Warn => {
                        warn!("normalization not supported yet for {}", request.algo)
                    }
                    UnsupportedPolicy::Error => {
                        return Err(ConfigError::NormalizationUnsupported(request.algo).into())
                    }
                }
            }
        }

        if let Some(n_stack) = request.frame_stack {
            env = Box::new(VecFrameStack::new(env, n_stack)?);
            info!("Stacking {} frames", n_stack);
        }

        Ok(ComposedEnv {
            env,
            normalized,
            n_stack: request.frame_stack,
        })
    }
}
