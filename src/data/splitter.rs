// ============================================================
// Layer 4 - Training/Validation Splitter
// ============================================================
// Carves a validation subset out of one image directory.
//
// The split is made per class and is not random: for a class
// with n files (in path order) the first floor(n * split) go to
// validation, the remaining files to training. Every class is
// therefore represented in both subsets in the same proportion,
// and re-running with the same tree yields the same subsets.

use anyhow::{bail, Result};

use crate::domain::image_sample::ImageSample;

/// Which part of a split directory to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subset {
    #[default]
    Training,
    Validation,
}

/// Keep the `subset` part of `samples` for a `validation_split` in [0, 1).
///
/// Samples are expected grouped by label, as `ImageFolder` returns them.
pub fn split_per_class(
    samples: Vec<ImageSample>,
    validation_split: f64,
    subset: Subset,
) -> Result<Vec<ImageSample>> {
    if !(0.0..1.0).contains(&validation_split) {
        bail!(
            "validation_split must be in [0, 1), got {}",
            validation_split
        );
    }

    let mut kept = Vec::with_capacity(samples.len());
    let mut start = 0;

    while start < samples.len() {
        let label = samples[start].label;
        let end = samples[start..]
            .iter()
            .position(|s| s.label != label)
            .map_or(samples.len(), |p| start + p);

        let count = end - start;
        let n_val = (count as f64 * validation_split).floor() as usize;
        let range = match subset {
            Subset::Validation => start..start + n_val,
            Subset::Training => start + n_val..end,
        };
        kept.extend_from_slice(&samples[range]);

        start = end;
    }

    tracing::debug!(
        "{:?} subset: kept {} of {} samples (validation_split={})",
        subset,
        kept.len(),
        samples.len(),
        validation_split
    );
    Ok(kept)
}
