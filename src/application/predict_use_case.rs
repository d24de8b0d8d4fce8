// ============================================================
// Layer 2 - PredictUseCase
// ============================================================
// Loads a trained checkpoint on the chosen backend and
// classifies one image.

use anyhow::Result;
use burn::backend::{wgpu::WgpuDevice, NdArray, Wgpu};
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};

use crate::domain::input_shape::ComputeBackend;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Predictor;

pub struct PredictUseCase {
    checkpoint_dir: PathBuf,
    backend: ComputeBackend,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, backend: ComputeBackend) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            backend,
        }
    }

    /// The `top_k` most likely classes for `image`, best first.
    pub fn classify(&self, image: &Path, top_k: usize) -> Result<Vec<(String, f32)>> {
        let ckpt = CheckpointManager::new(&self.checkpoint_dir);

        match self.backend {
            ComputeBackend::Wgpu => {
                let device = WgpuDevice::default();
                rank(&Predictor::<Wgpu>::from_checkpoint(&ckpt, &device)?, image, top_k)
            }
            ComputeBackend::NdArray => {
                let device = Default::default();
                rank(&Predictor::<NdArray>::from_checkpoint(&ckpt, &device)?, image, top_k)
            }
        }
    }
}

fn rank<B: Backend>(
    predictor: &Predictor<B>,
    image: &Path,
    top_k: usize,
) -> Result<Vec<(String, f32)>> {
    if top_k <= 1 {
        return Ok(vec![predictor.predict(image)?]);
    }
    predictor.predict_top_k(image, top_k)
}
