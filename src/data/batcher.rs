// ============================================================
// Layer 4 - Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack decoded images into
// one tensor pair.
//
//   Input:  N decoded images, each channels*height*width floats
//   Output: images  [N, channels, height, width]
//           targets [N]
//
// Decoding happens before this step so that a broken file can
// be reported as an error instead of silently producing zeros.

use burn::{data::dataloader::batcher::Batcher, prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::input_shape::InputShape;

/// One preprocessed image, channel-first, ready to be stacked.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// A batch of images and integer class labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Shape: [batch_size, channels, height, width], values in [0, 1]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size], class indices (not one-hot)
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }
}

impl<B: AutodiffBackend> ImageBatch<B> {
    /// Strip the autodiff wrapper, for evaluation with `model.valid()`.
    pub fn inner(self) -> ImageBatch<B::InnerBackend> {
        ImageBatch {
            images: self.images.inner(),
            targets: self.targets.inner(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageBatcher {
    shape: InputShape,
}

impl ImageBatcher {
    pub fn new(shape: InputShape) -> Self {
        Self { shape }
    }
}

impl<B: Backend> Batcher<B, DecodedImage, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<DecodedImage>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let InputShape {
            height,
            width,
            channels,
        } = self.shape;

        let mut pixels = Vec::with_capacity(batch_size * self.shape.volume());
        let mut labels = Vec::with_capacity(batch_size);
        for item in items {
            pixels.extend_from_slice(&item.pixels);
            labels.push(item.label as i64);
        }

        // One host-to-device copy for the whole batch
        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device)
            .reshape([batch_size, channels, height, width]);
        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let shape = InputShape::new(2, 3, 3);
        let items = (0..4)
            .map(|i| DecodedImage {
                pixels: vec![i as f32 / 4.0; shape.volume()],
                label: i % 2,
            })
            .collect();

        let batch: ImageBatch<B> = ImageBatcher::new(shape).batch(items, &device);

        assert_eq!(batch.images.dims(), [4, 3, 2, 3]);
        assert_eq!(batch.len(), 4);
        let labels = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_channel_planes_are_preserved() {
        let device = Default::default();
        let shape = InputShape::new(1, 2, 3);
        // R plane = 0.1, G plane = 0.5, B plane = 0.9
        let pixels = vec![0.1, 0.1, 0.5, 0.5, 0.9, 0.9];
        let items = vec![DecodedImage { pixels, label: 0 }];

        let batch: ImageBatch<B> = ImageBatcher::new(shape).batch(items, &device);
        let green = batch
            .images
            .slice([0..1, 1..2, 0..1, 0..2])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(green, vec![0.5, 0.5]);
    }
}
