// ============================================================
// Layer 3 - ImageSample Domain Type
// ============================================================

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single labelled image file.
///
/// The image itself is not held in memory; it is decoded only
/// when the batch containing it is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Location of the encoded image on disk
    pub path: PathBuf,

    /// Class index, i.e. the position of the class directory
    /// in the sorted list of class names
    pub label: usize,
}

impl ImageSample {
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}
