// ============================================================
// Layer 3 - Core Traits
// ============================================================

use anyhow::Result;

use crate::domain::{class_index::ClassIndex, image_sample::ImageSample};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Anything that can enumerate labelled images.
///
/// Implementations:
///   - ImageFolder -> one sub-directory per class
pub trait SampleSource {
    /// List every sample together with the class index used to label them.
    fn load_all(&self) -> Result<(Vec<ImageSample>, ClassIndex)>;
}
