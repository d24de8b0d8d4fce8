use burn::data::dataset::Dataset;

use crate::domain::{class_index::ClassIndex, image_sample::ImageSample};

/// In-memory list of image samples with their class index.
///
/// Holds paths only; decoding happens when a batch is built.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<ImageSample>,
    classes: ClassIndex,
}

impl ImageFolderDataset {
    pub fn new(samples: Vec<ImageSample>, classes: ClassIndex) -> Self {
        Self { samples, classes }
    }

    pub fn classes(&self) -> &ClassIndex {
        &self.classes
    }

    /// Number of samples carrying `label`.
    pub fn class_count(&self, label: usize) -> usize {
        self.samples.iter().filter(|s| s.label == label).count()
    }
}

impl Dataset<ImageSample> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
