// ============================================================
// Layer 5 - Shallow Convolutional Network
// ============================================================
// A small network trained from scratch:
//
//   Conv 6@5x5 'same'  + ReLU
//   MaxPool 2x2 (stride 2)
//   Conv 16@5x5 'valid' + tanh
//   AvgPool 2x2 (stride 2)
//   Flatten
//   Dense 64 + ReLU
//   Dense 12 (softmax in `forward`)
//
// Size calculation for an input of h x w:
//   conv1 'same'  : h x w
//   maxpool       : h/2 x w/2                 (floor)
//   conv2 'valid' : (h/2 - 4) x (w/2 - 4)
//   avgpool       : (h/2 - 4)/2 x (w/2 - 4)/2 (floor)
// For 150x150 that is 16 channels of 35x35 = 19600 features.

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    optim::Optimizer,
    prelude::*,
    tensor::{activation::relu, backend::AutodiffBackend},
};

use crate::domain::input_shape::InputShape;
use crate::ml::model::{compile, CompiledModel, ImageClassifier, NUM_CLASSES};

const CONV1_FILTERS: usize = 6;
const CONV2_FILTERS: usize = 16;
const KERNEL: usize = 5;
const HIDDEN: usize = 64;

#[derive(Config, Debug)]
pub struct ShallowCnnConfig {
    pub input_shape: InputShape,
    #[config(default = 12)]
    pub num_classes: usize,
}

impl ShallowCnnConfig {
    /// Height and width of the last feature map, or an error when the
    /// input is too small for the 'valid' convolution.
    pub fn feature_map(&self) -> Result<(usize, usize)> {
        let s = self.input_shape;
        if s.channels == 0 {
            bail!("Input shape {} has no channels", s);
        }

        let (h, w) = (s.height / 2, s.width / 2);
        if h < KERNEL || w < KERNEL {
            bail!(
                "Input shape {} is too small: the 5x5 'valid' convolution \
                 would see a {}x{} feature map",
                s,
                h,
                w
            );
        }

        let (h, w) = ((h - KERNEL + 1) / 2, (w - KERNEL + 1) / 2);
        if h == 0 || w == 0 {
            bail!("Input shape {} is too small: average pooling output is empty", s);
        }
        Ok((h, w))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ShallowCnn<B>> {
        let (h, w) = self.feature_map()?;
        let features = CONV2_FILTERS * h * w;

        tracing::debug!(
            "ShallowCnn: input {} -> feature map {}x{}x{} -> {} features",
            self.input_shape,
            CONV2_FILTERS,
            h,
            w,
            features
        );

        Ok(ShallowCnn {
            conv1: Conv2dConfig::new([self.input_shape.channels, CONV1_FILTERS], [KERNEL, KERNEL])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2: Conv2dConfig::new([CONV1_FILTERS, CONV2_FILTERS], [KERNEL, KERNEL])
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            pool2: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(features, HIDDEN).init(device),
            fc2: LinearConfig::new(HIDDEN, self.num_classes).init(device),
            num_classes: self.num_classes,
        })
    }
}

#[derive(Module, Debug)]
pub struct ShallowCnn<B: Backend> {
    conv1: Conv2d<B>,
    pool1: MaxPool2d,
    conv2: Conv2d<B>,
    pool2: AvgPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ImageClassifier<B> for ShallowCnn<B> {
    fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(images));
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x).tanh();
        let x = self.pool2.forward(x);

        let [batch_size, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = relu(self.fc1.forward(x));
        self.fc2.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Build and compile the shallow network for `input_shape`.
pub fn create_model<B: AutodiffBackend>(
    input_shape: InputShape,
    device: &B::Device,
) -> Result<CompiledModel<B, ShallowCnn<B>, impl Optimizer<ShallowCnn<B>, B>>>
where
    ShallowCnn<B>: AutodiffModule<B>,
{
    let model = ShallowCnnConfig::new(input_shape)
        .with_num_classes(NUM_CLASSES)
        .init(device)?;
    tracing::info!(
        "Built shallow CNN for input {} ({} parameters)",
        input_shape,
        model.num_params()
    );
    Ok(compile(model))
}
