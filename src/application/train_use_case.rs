// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Build the training flow        (Layer 4 - data)
//   Step 2: Build the validation flow      (Layer 4 - data)
//   Step 3: Check the classes fit the head (Layer 5 - ml)
//   Step 4: Save config and class names    (Layer 6 - infra)
//   Step 5: Build and compile the model    (Layer 5 - ml)
//   Step 6: Run the training loop          (Layer 5 - ml)
//   Step 7: Save weights and metrics       (Layer 6 - infra)

use anyhow::{bail, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    optim::Optimizer,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    flow::{FlowConfig, ImageFlow, DEFAULT_BATCH_SIZE, DEFAULT_SEED},
    splitter::Subset,
};
use crate::domain::input_shape::{Architecture, ComputeBackend, InputShape};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{History, MetricsLogger},
};
use crate::ml::{
    model::{CompiledModel, ImageClassifier, NUM_CLASSES},
    shallow::create_model,
    trainer::{train_model, FitOptions},
    transfer::{create_transfer_model, BackboneWeights},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run.
// Serialisable so it can be saved next to the checkpoint and
// reloaded to rebuild the same architecture for inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_dir: String,
    /// Separate validation directory; takes precedence over `validation_split`
    pub val_dir: Option<String>,
    /// Fraction of each training class held out for validation
    pub validation_split: f64,
    pub checkpoint_dir: String,
    pub architecture: Architecture,
    pub input_shape: InputShape,
    pub batch_size: usize,
    pub epochs: usize,
    pub steps_per_epoch: Option<usize>,
    pub validation_steps: Option<usize>,
    pub seed: u64,
    /// Pretrained ResNet-50 record, transfer architecture only
    pub backbone_weights: Option<String>,
    pub backbone_trainable: bool,
    pub backend: ComputeBackend,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_dir: "data/train".to_string(),
            val_dir: None,
            validation_split: 0.0,
            checkpoint_dir: "checkpoints".to_string(),
            architecture: Architecture::Shallow,
            input_shape: InputShape::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: Architecture::Shallow.default_epochs(),
            steps_per_epoch: None,
            validation_steps: None,
            seed: DEFAULT_SEED,
            backbone_weights: None,
            backbone_trainable: true,
            backend: ComputeBackend::Wgpu,
        }
    }
}

impl TrainConfig {
    fn flow_config(&self) -> FlowConfig {
        FlowConfig::default()
            .with_target(self.input_shape)
            .with_batch_size(self.batch_size)
            .with_seed(self.seed)
    }

    fn fit_options(&self) -> FitOptions {
        let mut options = FitOptions::default()
            .with_batch_size(self.batch_size)
            .with_epochs(self.epochs);
        if let Some(steps) = self.steps_per_epoch {
            options = options.with_steps_per_epoch(steps);
        }
        if let Some(steps) = self.validation_steps {
            options = options.with_validation_steps(steps);
        }
        options
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end on the
    /// configured backend and return the per-epoch metrics.
    pub fn execute(&self) -> Result<History> {
        match self.config.backend {
            ComputeBackend::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run::<Autodiff<Wgpu>>(&device)
            }
            ComputeBackend::NdArray => {
                tracing::info!("Using NdArray (CPU) backend");
                self.run::<Autodiff<NdArray>>(&Default::default())
            }
        }
    }

    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<History> {
        let cfg = &self.config;

        // ── Steps 1 and 2: training and validation flows ──────────────────────
        let (mut train, mut val) = self.build_flows::<B>(device)?;

        // ── Step 3: the head has a fixed number of outputs ────────────────────
        let classes = train.classes().clone();
        if classes.len() > NUM_CLASSES {
            bail!(
                "Found {} classes in '{}' but the model has only {} outputs",
                classes.len(),
                cfg.train_dir,
                NUM_CLASSES
            );
        }
        if val.classes() != &classes {
            bail!(
                "Validation classes {:?} differ from training classes {:?}",
                val.classes().names(),
                classes.names()
            );
        }

        // ── Step 4: save config for inference ─────────────────────────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt.save_config(cfg)?;
        ckpt.save_class_names(&classes)?;

        // ── Steps 5 to 7: build, train, save ──────────────────────────────────
        match cfg.architecture {
            Architecture::Shallow => {
                let compiled = create_model::<B>(cfg.input_shape, device)?;
                self.fit(compiled, &mut train, &mut val, &ckpt)
            }
            Architecture::Transfer => {
                let weights =
                    BackboneWeights::from_option(cfg.backbone_weights.as_ref().map(PathBuf::from));
                let compiled = create_transfer_model::<B>(
                    cfg.input_shape,
                    &weights,
                    cfg.backbone_trainable,
                    device,
                )?;
                self.fit(compiled, &mut train, &mut val, &ckpt)
            }
        }
    }

    fn build_flows<B: AutodiffBackend>(
        &self,
        device: &B::Device,
    ) -> Result<(ImageFlow<B>, ImageFlow<B>)> {
        let cfg = &self.config;
        let flow = cfg.flow_config();
        // Validation batches are read in file order
        let val_flow = flow.clone().with_shuffle(false);

        tracing::info!("Loading training images from '{}'", cfg.train_dir);

        match (&cfg.val_dir, cfg.validation_split > 0.0) {
            (Some(val_dir), _) => {
                if cfg.validation_split > 0.0 {
                    tracing::warn!(
                        "Both a validation directory and validation_split={} given; using '{}'",
                        cfg.validation_split,
                        val_dir
                    );
                }
                let train = flow.flow_from_directory(&cfg.train_dir, device)?;
                let val = val_flow.flow_from_directory(val_dir, device)?;
                Ok((train, val))
            }
            (None, true) => {
                let train = flow
                    .clone()
                    .with_split(cfg.validation_split, Subset::Training)
                    .flow_from_directory(&cfg.train_dir, device)?;
                let val = val_flow
                    .with_split(cfg.validation_split, Subset::Validation)
                    .flow_from_directory(&cfg.train_dir, device)?;
                Ok((train, val))
            }
            (None, false) => {
                tracing::warn!(
                    "No validation directory or split given; validating on the training images"
                );
                let train = flow.flow_from_directory(&cfg.train_dir, device)?;
                let val = val_flow.flow_from_directory(&cfg.train_dir, device)?;
                Ok((train, val))
            }
        }
    }

    fn fit<B, M, O>(
        &self,
        compiled: CompiledModel<B, M, O>,
        train: &mut ImageFlow<B>,
        val: &mut ImageFlow<B>,
        ckpt: &CheckpointManager,
    ) -> Result<History>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B> + AutodiffModule<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        O: Optimizer<M, B>,
    {
        let compiled = train_model(compiled, train, val, &self.config.fit_options())?;
        tracing::debug!(
            "Training read {} passes over {} images, validation {} passes over {}",
            train.passes(),
            train.num_samples(),
            val.passes(),
            val.num_samples()
        );

        let path = ckpt.save_model::<B, M>(compiled.model())?;
        tracing::info!("Checkpoint saved to '{}'", path.display());

        let logger = MetricsLogger::new(ckpt.dir())?;
        logger.log_history(compiled.history())?;
        tracing::info!("Metrics written to '{}'", logger.csv_path().display());

        Ok(compiled.history().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{flow::BatchSequence, test_utils::write_image_tree};

    type AB = Autodiff<NdArray>;

    fn small_config(root: &std::path::Path) -> TrainConfig {
        TrainConfig {
            train_dir: root.join("train").display().to_string(),
            checkpoint_dir: root.join("ckpt").display().to_string(),
            input_shape: InputShape::new(16, 16, 3),
            batch_size: 4,
            backend: ComputeBackend::NdArray,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_training_writes_checkpoint_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(&dir.path().join("train"), &[("apple", 6), ("kiwi", 6)], 20);
        let cfg = TrainConfig {
            validation_split: 0.25,
            epochs: 2,
            ..small_config(dir.path())
        };

        let history = TrainUseCase::new(cfg).run::<AB>(&Default::default()).unwrap();

        assert_eq!(history.len(), 2);
        // 5 of 6 images per class left after holding out 1 → 10 images, batches of 4
        assert_eq!(history.last().unwrap().steps, 3);
        assert_eq!(history.last().unwrap().validation_steps, 1);

        let ckpt = dir.path().join("ckpt");
        assert!(ckpt.join("model_final.mpk").exists());
        assert!(ckpt.join("train_config.json").exists());
        assert!(ckpt.join("class_names.json").exists());
        let csv = std::fs::read_to_string(ckpt.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_validation_flow_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(&dir.path().join("train"), &[("apple", 4), ("kiwi", 4)], 16);
        let cfg = TrainConfig {
            validation_split: 0.5,
            batch_size: 8,
            ..small_config(dir.path())
        };

        let (train, mut val) = TrainUseCase::new(cfg)
            .build_flows::<AB>(&Default::default())
            .unwrap();
        assert_eq!(train.num_samples(), 4);
        assert_eq!(val.num_samples(), 4);

        let labels = val
            .next_batch()
            .unwrap()
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(labels, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_too_many_classes_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..13).map(|i| format!("class_{i:02}")).collect();
        let tree: Vec<(&str, usize)> = names.iter().map(|n| (n.as_str(), 1)).collect();
        write_image_tree(&dir.path().join("train"), &tree, 16);

        let err = TrainUseCase::new(small_config(dir.path()))
            .run::<AB>(&Default::default())
            .unwrap_err();
        assert!(err.to_string().contains("only 12 outputs"));
    }

    #[test]
    fn test_mismatched_validation_classes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(&dir.path().join("train"), &[("apple", 2), ("kiwi", 2)], 16);
        write_image_tree(&dir.path().join("val"), &[("apple", 2), ("plum", 2)], 16);
        let cfg = TrainConfig {
            val_dir: Some(dir.path().join("val").display().to_string()),
            ..small_config(dir.path())
        };

        let err = TrainUseCase::new(cfg).run::<AB>(&Default::default()).unwrap_err();
        assert!(err.to_string().contains("differ from training classes"));
    }
}
