// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores trained models with Burn's named MessagePack
// recorder at full precision, so a reloaded model reproduces the
// trained one exactly.
//
// What gets saved per training run:
//   1. model_final.mpk     - all learned parameters
//   2. train_config.json   - architecture and input shape
//   3. class_names.json    - label → class directory name
//
// The config and class names are kept next to the weights
// because a record can only be loaded into a model of the same
// architecture: inference rebuilds the model from the config
// first, then restores the parameters into it, then maps the
// winning output back to a class name.
//
//   checkpoints/
//     model_final.mpk
//     train_config.json
//     class_names.json
//     metrics.csv         ← written by MetricsLogger

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{DefaultFileRecorder, FullPrecisionSettings, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::class_index::ClassIndex;

const MODEL_FILE: &str = "model_final";
const CONFIG_FILE: &str = "train_config.json";
const CLASS_NAMES_FILE: &str = "class_names.json";

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// The directory is created on the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Cannot create checkpoint directory '{}'", self.dir.display())
        })
    }

    /// Save the final model weights.
    ///
    /// The recorder adds the `.mpk` extension itself.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(MODEL_FILE);

        DefaultFileRecorder::<FullPrecisionSettings>::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(path)
    }

    /// Restore the saved weights into `model`.
    ///
    /// `model` must have the architecture the checkpoint was saved
    /// from, or loading fails.
    pub fn load_model<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let path = self.dir.join(MODEL_FILE);
        tracing::info!("Loading checkpoint '{}'", path.display());

        let record = DefaultFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'predict'.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed training config '{}'", path.display()))
    }

    pub fn save_class_names(&self, classes: &ClassIndex) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CLASS_NAMES_FILE);
        let json = serde_json::to_string_pretty(classes.names())?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write class names to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_class_names(&self) -> Result<ClassIndex> {
        let path = self.dir.join(CLASS_NAMES_FILE);

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read class names from '{}'", path.display()))?;
        let names: Vec<String> = serde_json::from_str(&json)
            .with_context(|| format!("Malformed class names file '{}'", path.display()))?;

        Ok(ClassIndex::from_names(names))
    }
}
