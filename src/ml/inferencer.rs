// ============================================================
// Layer 5 - Predictor
// ============================================================
// Classifies single images with a trained checkpoint.
//
// The saved TrainConfig says which architecture and input shape
// to rebuild; the checkpoint record then overwrites its freshly
// initialised parameters. Images go through the same
// preprocessing as during training (resize, channels-first,
// rescale by 1/255).

use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use std::path::Path;

use crate::data::preprocessor::{ImagePreprocessor, RESCALE};
use crate::domain::{class_index::ClassIndex, input_shape::Architecture};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    model::{ImageClassifier, NUM_CLASSES},
    shallow::{ShallowCnn, ShallowCnnConfig},
    transfer::{BackboneWeights, TransferNet, TransferNetConfig},
};

/// A trained network of either architecture.
pub enum Network<B: Backend> {
    Shallow(ShallowCnn<B>),
    Transfer(TransferNet<B>),
}

impl<B: Backend> Network<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Network::Shallow(model) => model.forward(images),
            Network::Transfer(model) => model.forward(images),
        }
    }
}

pub struct Predictor<B: Backend> {
    network: Network<B>,
    preprocessor: ImagePreprocessor,
    classes: ClassIndex,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(
        network: Network<B>,
        preprocessor: ImagePreprocessor,
        classes: ClassIndex,
        device: B::Device,
    ) -> Self {
        Self {
            network,
            preprocessor,
            classes,
            device,
        }
    }

    pub fn from_checkpoint(ckpt: &CheckpointManager, device: &B::Device) -> Result<Self> {
        let cfg = ckpt.load_config()?;
        let classes = ckpt.load_class_names()?;

        let network = match cfg.architecture {
            Architecture::Shallow => {
                let model = ShallowCnnConfig::new(cfg.input_shape)
                    .with_num_classes(NUM_CLASSES)
                    .init::<B>(device)?;
                Network::Shallow(ckpt.load_model::<B, _>(model, device)?)
            }
            Architecture::Transfer => {
                // Every parameter comes from the checkpoint
                let model = TransferNetConfig::new(cfg.input_shape)
                    .with_num_classes(NUM_CLASSES)
                    .init::<B>(&BackboneWeights::Random, device)?;
                Network::Transfer(ckpt.load_model::<B, _>(model, device)?)
            }
        };
        tracing::info!(
            "Loaded {} model for input {} with {} classes",
            cfg.architecture,
            cfg.input_shape,
            classes.len()
        );

        let preprocessor = ImagePreprocessor::new(cfg.input_shape, RESCALE)?;
        Ok(Self::new(network, preprocessor, classes, device.clone()))
    }

    /// Most likely class of the image at `path` and its probability.
    pub fn predict(&self, path: &Path) -> Result<(String, f32)> {
        self.predict_top_k(path, 1)?
            .into_iter()
            .next()
            .with_context(|| format!("No prediction for '{}'", path.display()))
    }

    /// The `k` most likely classes, best first.
    ///
    /// Outputs past the known classes are never reported.
    pub fn predict_top_k(&self, path: &Path, k: usize) -> Result<Vec<(String, f32)>> {
        let pixels = self.preprocessor.load(path)?;
        let s = self.preprocessor.target();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([1, s.channels, s.height, s.width]);
        let probs = self
            .network
            .forward(images)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read model output: {e:?}"))?;

        let mut ranked: Vec<(usize, f32)> = probs
            .into_iter()
            .enumerate()
            .take(self.classes.len())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        let top = ranked
            .into_iter()
            .filter_map(|(label, p)| self.classes.name_of(label).map(|n| (n.to_string(), p)))
            .collect::<Vec<_>>();

        if let Some((name, p)) = top.first() {
            tracing::debug!("'{}' → {} ({:.4})", path.display(), name, p);
        }
        Ok(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::data::test_utils::write_image_tree;
    use crate::domain::input_shape::InputShape;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_predict_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt"));
        let device = Default::default();
        let shape = InputShape::new(16, 16, 3);

        let model = ShallowCnnConfig::new(shape).init::<B>(&device).unwrap();
        ckpt.save_model::<B, _>(&model).unwrap();
        ckpt.save_config(&TrainConfig {
            input_shape: shape,
            ..TrainConfig::default()
        })
        .unwrap();
        ckpt.save_class_names(&ClassIndex::from_names(["apple", "kiwi", "plum"]))
            .unwrap();

        write_image_tree(&dir.path().join("images"), &[("any", 1)], 24);
        let image = dir.path().join("images/any/img_000.png");

        let predictor = Predictor::<B>::from_checkpoint(&ckpt, &device).unwrap();
        let top = predictor.predict_top_k(&image, 5).unwrap();

        // Only the three known classes can be reported
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
        let total: f32 = top.iter().map(|(_, p)| p).sum();
        assert!(total > 0.0 && total <= 1.0 + 1e-5);

        let (best, p) = predictor.predict(&image).unwrap();
        assert_eq!((best, p), top[0].clone());
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        assert!(Predictor::<B>::from_checkpoint(&ckpt, &Default::default()).is_err());
    }
}
