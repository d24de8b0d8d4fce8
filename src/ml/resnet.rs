// ============================================================
// Layer 5 - ResNet Backbone
// ============================================================
// Bottleneck residual network without its classification top,
// used as the feature extractor of the transfer network.
//
//   stem:   Conv 64@7x7 /2, BatchNorm, ReLU, MaxPool 3x3 /2
//   stage1: blocks[0] bottlenecks, width  64 → 256 channels
//   stage2: blocks[1] bottlenecks, width 128 → 512 channels, /2
//   stage3: blocks[2] bottlenecks, width 256 → 1024 channels, /2
//   stage4: blocks[3] bottlenecks, width 512 → 2048 channels, /2
//
// blocks = [3, 4, 6, 3] is ResNet-50. The output is a
// [batch, 2048, h/32, w/32] feature map.
//
// Bottleneck: 1x1 reduce → 3x3 (carries the stride) → 1x1 expand
// (x4), each followed by BatchNorm; ReLU after the first two and
// after the residual sum. A 1x1 projection replaces the identity
// whenever the shape changes.

use anyhow::{Context, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    prelude::*,
    record::{DefaultFileRecorder, FullPrecisionSettings, Recorder},
    tensor::activation::relu,
};
use std::path::Path;

pub const EXPANSION: usize = 4;
pub const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];
/// Channels of the backbone output.
pub const OUT_CHANNELS: usize = 512 * EXPANSION;
/// Smallest input side that survives the five /2 reductions.
pub const MIN_INPUT_SIZE: usize = 32;

#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Bottleneck blocks per stage
    #[config(default = "[3, 4, 6, 3]")]
    pub blocks: [usize; 4],
    #[config(default = 3)]
    pub in_channels: usize,
}

impl ResNetConfig {
    pub fn resnet50() -> Self {
        Self::new()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let stem_conv = Conv2dConfig::new([self.in_channels, STAGE_WIDTHS[0]], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);

        let mut in_channels = STAGE_WIDTHS[0];
        let mut stages: Vec<Vec<Bottleneck<B>>> = Vec::with_capacity(4);

        for (stage, (&width, &blocks)) in STAGE_WIDTHS.iter().zip(self.blocks.iter()).enumerate() {
            let stride = if stage == 0 { 1 } else { 2 };
            let mut layer = Vec::with_capacity(blocks);
            for i in 0..blocks {
                let s = if i == 0 { stride } else { 1 };
                layer.push(bottleneck(in_channels, width, s, device));
                in_channels = width * EXPANSION;
            }
            stages.push(layer);
        }

        let mut stages = stages.into_iter();
        ResNet {
            conv1: stem_conv,
            bn1: BatchNormConfig::new(STAGE_WIDTHS[0]).init(device),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: stages.next().unwrap_or_default(),
            layer2: stages.next().unwrap_or_default(),
            layer3: stages.next().unwrap_or_default(),
            layer4: stages.next().unwrap_or_default(),
        }
    }
}

fn bottleneck<B: Backend>(
    in_channels: usize,
    width: usize,
    stride: usize,
    device: &B::Device,
) -> Bottleneck<B> {
    let out_channels = width * EXPANSION;

    let downsample = (stride != 1 || in_channels != out_channels).then(|| Downsample {
        conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_bias(false)
            .init(device),
        bn: BatchNormConfig::new(out_channels).init(device),
    });

    Bottleneck {
        conv1: Conv2dConfig::new([in_channels, width], [1, 1])
            .with_bias(false)
            .init(device),
        bn1: BatchNormConfig::new(width).init(device),
        conv2: Conv2dConfig::new([width, width], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device),
        bn2: BatchNormConfig::new(width).init(device),
        conv3: Conv2dConfig::new([width, out_channels], [1, 1])
            .with_bias(false)
            .init(device),
        bn3: BatchNormConfig::new(out_channels).init(device),
        downsample,
    }
}

#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.forward(x.clone()),
            None => x.clone(),
        };

        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        let out = relu(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));

        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    maxpool: MaxPool2d,
    layer1: Vec<Bottleneck<B>>,
    layer2: Vec<Bottleneck<B>>,
    layer3: Vec<Bottleneck<B>>,
    layer4: Vec<Bottleneck<B>>,
}

impl<B: Backend> ResNet<B> {
    /// images: [batch, channels, h, w] → features: [batch, 2048, h/32, w/32]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.bn1.forward(self.conv1.forward(images)));
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }
        x
    }

    /// Whether the stem convolution takes part in gradient computation.
    /// Freezing always covers the whole backbone, so the stem speaks for it.
    pub fn requires_grad(&self) -> bool {
        self.conv1.weight.val().is_require_grad()
    }

    /// Replace the parameters with the record stored at `path`.
    pub fn load_weights(self, path: &Path, device: &B::Device) -> Result<Self> {
        let record = DefaultFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .with_context(|| {
                format!(
                    "Cannot initialise pretrained backbone weights from '{}'",
                    path.display()
                )
            })?;
        Ok(self.load_record(record))
    }
}
