// ============================================================
// Layer 5 - Transfer Network
// ============================================================
// ResNet-50 feature extractor with a dense classification head:
//
//   ResNet-50 (no top)          [n, 2048, h/32, w/32]
//   Global average pooling      [n, 2048]
//   Dense 128 + ReLU
//   Dense  64 + ReLU
//   Dense  64 + ReLU
//   Dense  32 + ReLU
//   Dense  16 + ReLU
//   Dense  12 (softmax in `forward`)
//
// The backbone either starts from pretrained weights or from a
// random initialisation, and stays trainable unless frozen.

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig,
    },
    optim::Optimizer,
    prelude::*,
    tensor::{activation::relu, backend::AutodiffBackend},
};
use std::path::PathBuf;

use crate::domain::input_shape::InputShape;
use crate::ml::model::{compile, CompiledModel, ImageClassifier, NUM_CLASSES};
use crate::ml::resnet::{ResNet, ResNetConfig, MIN_INPUT_SIZE, OUT_CHANNELS};

/// Hidden widths of the classification head, in order.
pub const HEAD_WIDTHS: [usize; 5] = [128, 64, 64, 32, 16];

/// Where the backbone parameters come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackboneWeights {
    /// A full-precision burn record of a `ResNet` with the same block layout
    Pretrained(PathBuf),
    Random,
}

impl BackboneWeights {
    pub fn from_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) => Self::Pretrained(p),
            None => Self::Random,
        }
    }
}

#[derive(Config, Debug)]
pub struct TransferNetConfig {
    pub input_shape: InputShape,
    #[config(default = 12)]
    pub num_classes: usize,
    /// When false the backbone parameters receive no gradient
    #[config(default = true)]
    pub backbone_trainable: bool,
    #[config(default = "ResNetConfig::resnet50()")]
    pub backbone: ResNetConfig,
}

impl TransferNetConfig {
    fn check_input(&self, weights: &BackboneWeights) -> Result<()> {
        let s = self.input_shape;
        if s.height < MIN_INPUT_SIZE || s.width < MIN_INPUT_SIZE {
            bail!(
                "Input shape {} is too small for the ResNet backbone: \
                 height and width must be at least {}",
                s,
                MIN_INPUT_SIZE
            );
        }
        if s.channels == 0 {
            bail!("Input shape {} has no channels", s);
        }
        if matches!(weights, BackboneWeights::Pretrained(_)) && s.channels != 3 {
            bail!(
                "Input shape {} has {} channels; pretrained backbone weights expect 3",
                s,
                s.channels
            );
        }
        Ok(())
    }

    pub fn init<B: Backend>(
        &self,
        weights: &BackboneWeights,
        device: &B::Device,
    ) -> Result<TransferNet<B>> {
        self.check_input(weights)?;

        let backbone = self
            .backbone
            .clone()
            .with_in_channels(self.input_shape.channels)
            .init(device);

        let backbone = match weights {
            BackboneWeights::Pretrained(path) => {
                tracing::info!("Loading backbone weights from {}", path.display());
                backbone.load_weights(path, device)?
            }
            BackboneWeights::Random => backbone,
        };

        let backbone = if self.backbone_trainable {
            backbone
        } else {
            backbone.no_grad()
        };

        let mut head = Vec::with_capacity(HEAD_WIDTHS.len());
        let mut width = OUT_CHANNELS;
        for &next in HEAD_WIDTHS.iter() {
            head.push(LinearConfig::new(width, next).init(device));
            width = next;
        }

        Ok(TransferNet {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head,
            output: LinearConfig::new(width, self.num_classes).init(device),
            num_classes: self.num_classes,
        })
    }
}

#[derive(Module, Debug)]
pub struct TransferNet<B: Backend> {
    backbone: ResNet<B>,
    pool: AdaptiveAvgPool2d,
    head: Vec<Linear<B>>,
    output: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> TransferNet<B> {
    pub fn backbone(&self) -> &ResNet<B> {
        &self.backbone
    }
}

impl<B: Backend> ImageClassifier<B> for TransferNet<B> {
    fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);

        // [n, 2048, h', w'] → [n, 2048, 1, 1] → [n, 2048]
        let pooled = self.pool.forward(features);
        let [batch_size, channels, _, _] = pooled.dims();
        let mut x = pooled.reshape([batch_size, channels]);

        for layer in &self.head {
            x = relu(layer.forward(x));
        }
        self.output.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Build and compile the transfer network for `input_shape`.
pub fn create_transfer_model<B: AutodiffBackend>(
    input_shape: InputShape,
    weights: &BackboneWeights,
    backbone_trainable: bool,
    device: &B::Device,
) -> Result<CompiledModel<B, TransferNet<B>, impl Optimizer<TransferNet<B>, B>>>
where
    TransferNet<B>: AutodiffModule<B>,
{
    if *weights == BackboneWeights::Random {
        tracing::warn!("No backbone weights given: the ResNet-50 backbone starts from random weights");
    }
    let model = TransferNetConfig::new(input_shape)
        .with_num_classes(NUM_CLASSES)
        .with_backbone_trainable(backbone_trainable)
        .init(weights, device)?;
    tracing::info!(
        "Built ResNet-50 transfer network for input {} ({} parameters, backbone trainable: {})",
        input_shape,
        model.num_params(),
        model.backbone().requires_grad()
    );
    Ok(compile(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::record::{DefaultFileRecorder, FullPrecisionSettings};

    type B = NdArray;
    type AB = Autodiff<NdArray>;

    fn small_config(shape: InputShape) -> TransferNetConfig {
        TransferNetConfig::new(shape).with_backbone(ResNetConfig::new().with_blocks([1, 1, 1, 1]))
    }

    #[test]
    fn test_output_is_a_distribution_over_12_classes() {
        let device = Default::default();
        let model = TransferNetConfig::new(InputShape::new(32, 32, 3))
            .init::<B>(&BackboneWeights::Random, &device)
            .unwrap();

        let images = Tensor::<B, 4>::random([2, 3, 32, 32], burn::tensor::Distribution::Default, &device);
        let probs = model.forward(images);

        assert_eq!(probs.dims(), [2, 12]);
        let sums = probs.sum_dim(1).into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4, "row sums to {s}");
        }
    }

    #[test]
    fn test_head_layout() {
        let model = small_config(InputShape::new(32, 32, 3))
            .init::<B>(&BackboneWeights::Random, &Default::default())
            .unwrap();
        let widths: Vec<[usize; 2]> = model.head.iter().map(|l| l.weight.val().dims()).collect();
        assert_eq!(
            widths,
            vec![[2048, 128], [128, 64], [64, 64], [64, 32], [32, 16]]
        );
        assert_eq!(model.output.weight.val().dims(), [16, 12]);
    }

    #[test]
    fn test_backbone_trainable_flag() {
        let device = Default::default();
        let shape = InputShape::new(32, 32, 3);

        let trainable = small_config(shape)
            .init::<AB>(&BackboneWeights::Random, &device)
            .unwrap();
        assert!(trainable.backbone().requires_grad());

        let frozen = small_config(shape)
            .with_backbone_trainable(false)
            .init::<AB>(&BackboneWeights::Random, &device)
            .unwrap();
        assert!(!frozen.backbone().requires_grad());
    }

    #[test]
    fn test_input_geometry_is_checked() {
        let device = Default::default();

        let err = small_config(InputShape::new(31, 64, 3))
            .init::<B>(&BackboneWeights::Random, &device)
            .unwrap_err();
        assert!(err.to_string().contains("at least 32"));

        let err = small_config(InputShape::new(32, 32, 1))
            .init::<B>(&BackboneWeights::Pretrained("weights".into()), &device)
            .unwrap_err();
        assert!(err.to_string().contains("expect 3"));

        // Grayscale is fine without pretrained weights
        assert!(small_config(InputShape::new(32, 32, 1))
            .init::<B>(&BackboneWeights::Random, &device)
            .is_ok());
    }

    #[test]
    fn test_pretrained_weights_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnet");
        let device = Default::default();
        let cfg = small_config(InputShape::new(32, 32, 3));

        let donor = cfg.backbone.init::<B>(&device);
        donor
            .clone()
            .save_file(&path, &DefaultFileRecorder::<FullPrecisionSettings>::new())
            .unwrap();

        let model = cfg
            .init::<B>(&BackboneWeights::Pretrained(path), &device)
            .unwrap();
        let images = Tensor::<B, 4>::ones([1, 3, 32, 32], &device);
        let expected = donor.forward(images.clone()).into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let actual = model.backbone().forward(images).into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_missing_pretrained_weights_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = small_config(InputShape::new(32, 32, 3))
            .init::<B>(&BackboneWeights::Pretrained(dir.path().join("absent")), &Default::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_backbone_weights_from_option() {
        assert_eq!(BackboneWeights::from_option(None), BackboneWeights::Random);
        assert_eq!(
            BackboneWeights::from_option(Some("w.mpk".into())),
            BackboneWeights::Pretrained("w.mpk".into())
        );
    }
}
