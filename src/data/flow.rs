// ============================================================
// Layer 4 - Image Flow
// ============================================================
// An endless sequence of batches drawn from an image directory.
//
// A flow owns a shuffled order over its samples and walks it one
// batch at a time. When the order is used up, a new pass starts
// with a freshly shuffled order drawn from the same seeded RNG,
// so a flow never runs dry. The last batch of a pass holds the
// remainder, which makes a pass exactly
// ceil(samples / batch_size) batches long.
//
// Images are decoded only when the batch containing them is
// requested. A flow cannot be rewound; build a new one from the
// same config to start over with the same order.

use anyhow::{bail, Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::path::Path;

use crate::data::{
    batcher::{DecodedImage, ImageBatch, ImageBatcher},
    dataset::ImageFolderDataset,
    loader::ImageFolder,
    preprocessor::{ImagePreprocessor, RESCALE},
    splitter::{split_per_class, Subset},
};
use crate::domain::{class_index::ClassIndex, input_shape::InputShape, traits::SampleSource};

pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_SEED: u64 = 12345;

// ─── BatchSequence ────────────────────────────────────────────────────────────
/// A source of batches that never ends but knows how long one pass is.
///
/// The trainer relies on `batches_per_epoch` to decide how many steps
/// make an epoch when the caller does not say.
pub trait BatchSequence<B: Backend> {
    /// Number of batches in one full pass over the underlying samples.
    fn batches_per_epoch(&self) -> usize;

    /// Largest number of samples in a batch.
    fn batch_size(&self) -> usize;

    /// Produce the next batch.
    fn next_batch(&mut self) -> Result<ImageBatch<B>>;
}

// ─── FlowConfig ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub target: InputShape,
    pub batch_size: usize,
    pub seed: u64,
    pub shuffle: bool,
    pub rescale: f32,
    pub validation_split: f64,
    pub subset: Subset,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            target: InputShape::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            seed: DEFAULT_SEED,
            shuffle: true,
            rescale: RESCALE,
            validation_split: 0.0,
            subset: Subset::Training,
        }
    }
}

impl FlowConfig {
    pub fn with_target(mut self, target: InputShape) -> Self {
        self.target = target;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_split(mut self, validation_split: f64, subset: Subset) -> Self {
        self.validation_split = validation_split;
        self.subset = subset;
        self
    }

    /// Build a flow over the class directories below `path`.
    pub fn flow_from_directory<B: Backend>(
        &self,
        path: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<ImageFlow<B>> {
        let path = path.as_ref();
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }

        let (samples, classes) = ImageFolder::new(path)
            .load_all()
            .with_context(|| format!("Cannot load images from '{}'", path.display()))?;

        let samples = split_per_class(samples, self.validation_split, self.subset)?;
        if samples.is_empty() {
            bail!(
                "The {:?} subset of '{}' contains no images",
                self.subset,
                path.display()
            );
        }

        let preprocessor = ImagePreprocessor::new(self.target, self.rescale)?;
        let dataset = ImageFolderDataset::new(samples, classes);

        tracing::info!(
            "Flow over '{}': {} images, {} classes, {} batches of up to {}",
            path.display(),
            dataset.len(),
            dataset.classes().len(),
            dataset.len().div_ceil(self.batch_size),
            self.batch_size
        );
        for (label, name) in dataset.classes().names().iter().enumerate() {
            tracing::debug!("  class {} '{}': {} images", label, name, dataset.class_count(label));
        }

        Ok(ImageFlow::new(dataset, preprocessor, self, device.clone()))
    }
}

/// Training flow with the default settings: 150x150 RGB, rescaled
/// by 1/255, shuffled with seed 12345, batches of 16.
pub fn load_train<B: Backend>(path: impl AsRef<Path>, device: &B::Device) -> Result<ImageFlow<B>> {
    FlowConfig::default().flow_from_directory(path, device)
}

// ─── ImageFlow ────────────────────────────────────────────────────────────────
pub struct ImageFlow<B: Backend> {
    dataset: ImageFolderDataset,
    preprocessor: ImagePreprocessor,
    batcher: ImageBatcher,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
    device: B::Device,
}

impl<B: Backend> ImageFlow<B> {
    fn new(
        dataset: ImageFolderDataset,
        preprocessor: ImagePreprocessor,
        cfg: &FlowConfig,
        device: B::Device,
    ) -> Self {
        let order: Vec<usize> = (0..dataset.len()).collect();
        // Cursor starts past the end so the first request opens pass 1.
        let cursor = order.len();
        Self {
            batcher: ImageBatcher::new(preprocessor.target()),
            dataset,
            preprocessor,
            batch_size: cfg.batch_size,
            shuffle: cfg.shuffle,
            rng: StdRng::seed_from_u64(cfg.seed),
            order,
            cursor,
            passes: 0,
            device,
        }
    }

    pub fn classes(&self) -> &ClassIndex {
        self.dataset.classes()
    }

    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    /// Passes started so far (the current one included).
    pub fn passes(&self) -> usize {
        self.passes
    }

    fn start_pass(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
        self.passes += 1;
        tracing::debug!("Starting pass {} over {} images", self.passes, self.order.len());
    }
}

impl<B: Backend> BatchSequence<B> for ImageFlow<B> {
    fn batches_per_epoch(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self) -> Result<ImageBatch<B>> {
        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let mut items = Vec::with_capacity(end - self.cursor);

        for &index in &self.order[self.cursor..end] {
            let sample = self
                .dataset
                .get(index)
                .with_context(|| format!("Sample index {index} out of range"))?;
            let pixels = self.preprocessor.load(&sample.path)?;
            items.push(DecodedImage {
                pixels,
                label: sample.label,
            });
        }
        self.cursor = end;

        Ok(self.batcher.batch(items, &self.device))
    }
}

/// Endless: `next` always returns `Some`.
impl<B: Backend> Iterator for ImageFlow<B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_utils::write_image_tree;
    use burn::backend::NdArray;

    type B = NdArray;

    fn labels(batch: ImageBatch<B>) -> Vec<i64> {
        batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap()
    }

    #[test]
    fn test_load_train_batches_have_expected_shape_and_range() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("apple", 3), ("banana", 2)], 20);
        let device = Default::default();

        let mut flow = load_train::<B>(dir.path(), &device).unwrap();
        assert_eq!(flow.batches_per_epoch(), 1);

        let batch = flow.next_batch().unwrap();
        assert_eq!(batch.images.dims(), [5, 3, 150, 150]);

        let pixels = batch.images.clone().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(pixels.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(labels(batch).iter().all(|l| (0..12).contains(l)));
    }

    #[test]
    fn test_last_batch_holds_remainder_then_flow_cycles() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 5), ("b", 5)], 6);
        let device = Default::default();

        let cfg = FlowConfig::default()
            .with_target(InputShape::new(12, 12, 3))
            .with_batch_size(4);
        let mut flow = cfg.flow_from_directory::<B>(dir.path(), &device).unwrap();

        assert_eq!(flow.batches_per_epoch(), 3);
        let sizes: Vec<usize> = (0..4).map(|_| flow.next_batch().unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2, 4]);
        assert_eq!(flow.passes(), 2);
    }

    #[test]
    fn test_every_sample_seen_once_per_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 3), ("b", 4)], 6);
        let device = Default::default();

        let cfg = FlowConfig::default()
            .with_target(InputShape::new(8, 8, 3))
            .with_batch_size(3);
        let mut flow = cfg.flow_from_directory::<B>(dir.path(), &device).unwrap();

        let mut seen: Vec<i64> = Vec::new();
        for _ in 0..flow.batches_per_epoch() {
            seen.extend(labels(flow.next_batch().unwrap()));
        }
        seen.sort();
        assert_eq!(seen, vec![0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_same_seed_gives_same_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 6), ("b", 6)], 6);
        let device = Default::default();
        let cfg = FlowConfig::default()
            .with_target(InputShape::new(8, 8, 3))
            .with_batch_size(12);

        let mut first = cfg.flow_from_directory::<B>(dir.path(), &device).unwrap();
        let mut second = cfg.flow_from_directory::<B>(dir.path(), &device).unwrap();

        assert_eq!(
            labels(first.next_batch().unwrap()),
            labels(second.next_batch().unwrap())
        );
    }

    #[test]
    fn test_unshuffled_flow_keeps_path_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 2), ("b", 2)], 6);
        let device = Default::default();
        let cfg = FlowConfig::default()
            .with_target(InputShape::new(8, 8, 3))
            .with_shuffle(false);

        let mut flow = cfg.flow_from_directory::<B>(dir.path(), &device).unwrap();
        assert_eq!(labels(flow.next_batch().unwrap()), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_validation_subset() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 10), ("b", 10)], 6);
        let device = Default::default();
        let base = FlowConfig::default().with_target(InputShape::new(8, 8, 3));

        let train = base
            .clone()
            .with_split(0.2, Subset::Training)
            .flow_from_directory::<B>(dir.path(), &device)
            .unwrap();
        let val = base
            .with_split(0.2, Subset::Validation)
            .flow_from_directory::<B>(dir.path(), &device)
            .unwrap();

        assert_eq!(train.num_samples(), 16);
        assert_eq!(val.num_samples(), 4);
    }

    #[test]
    fn test_iterator_never_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 1)], 6);
        let device = Default::default();
        let cfg = FlowConfig::default().with_target(InputShape::new(8, 8, 3));

        let flow = cfg.flow_from_directory::<B>(dir.path(), &device).unwrap();
        let batches: Vec<_> = flow.take(5).collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 5);
    }

    #[test]
    fn test_broken_image_fails_its_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 1)], 6);
        std::fs::write(dir.path().join("a").join("zz_broken.png"), b"garbage").unwrap();
        let device = Default::default();

        let mut flow = load_train::<B>(dir.path(), &device).unwrap();
        assert!(flow.next_batch().is_err());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        assert!(load_train::<B>(dir.path().join("missing"), &device).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_image_tree(dir.path(), &[("a", 1)], 6);
        let device = Default::default();
        let cfg = FlowConfig::default().with_batch_size(0);
        assert!(cfg.flow_from_directory::<B>(dir.path(), &device).is_err());
    }
}
