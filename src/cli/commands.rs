// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and all
// their configurable flags.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::domain::input_shape::{Architecture, ComputeBackend, InputShape};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier on a directory with one sub-directory per class
    Train(TrainArgs),

    /// Classify an image with a trained checkpoint
    Predict(PredictArgs),
}

/// Burn backend to run on
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    Wgpu,
    Ndarray,
}

impl From<BackendArg> for ComputeBackend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu => ComputeBackend::Wgpu,
            BackendArg::Ndarray => ComputeBackend::NdArray,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchitectureArg {
    /// Two convolutions and a small dense head, trained from scratch
    Shallow,
    /// ResNet-50 backbone with a dense head
    Transfer,
}

impl From<ArchitectureArg> for Architecture {
    fn from(a: ArchitectureArg) -> Self {
        match a {
            ArchitectureArg::Shallow => Architecture::Shallow,
            ArchitectureArg::Transfer => Architecture::Transfer,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory with one sub-directory of images per class
    #[arg(long, default_value = "data/train")]
    pub train_dir: String,

    /// Directory with the same class layout, used for validation
    #[arg(long)]
    pub val_dir: Option<String>,

    /// Fraction of each training class held out for validation
    /// when no --val-dir is given
    #[arg(long, default_value_t = 0.0)]
    pub validation_split: f64,

    /// Directory to save the checkpoint, config and metrics to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = ArchitectureArg::Shallow)]
    pub architecture: ArchitectureArg,

    /// Images are resized to this height
    #[arg(long, default_value_t = 150)]
    pub height: usize,

    /// Images are resized to this width
    #[arg(long, default_value_t = 150)]
    pub width: usize,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Training epochs (default: 1 for shallow, 5 for transfer)
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Training batches per epoch (default: one pass over the images)
    #[arg(long)]
    pub steps_per_epoch: Option<usize>,

    /// Validation batches per epoch (default: one pass over the images)
    #[arg(long)]
    pub validation_steps: Option<usize>,

    /// Seed of the shuffling order
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,

    /// Pretrained ResNet-50 weights (transfer architecture only)
    #[arg(long)]
    pub backbone_weights: Option<String>,

    /// Keep the backbone parameters fixed during training
    #[arg(long)]
    pub freeze_backbone: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let architecture: Architecture = a.architecture.into();
        TrainConfig {
            train_dir: a.train_dir,
            val_dir: a.val_dir,
            validation_split: a.validation_split,
            checkpoint_dir: a.checkpoint_dir,
            architecture,
            input_shape: InputShape::new(a.height, a.width, 3),
            batch_size: a.batch_size,
            epochs: a.epochs.unwrap_or_else(|| architecture.default_epochs()),
            steps_per_epoch: a.steps_per_epoch,
            validation_steps: a.validation_steps,
            seed: a.seed,
            backbone_weights: a.backbone_weights,
            backbone_trainable: !a.freeze_backbone,
            backend: a.backend.into(),
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    #[arg(long)]
    pub image: PathBuf,

    /// Directory where the checkpoint was saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of classes to print
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}
