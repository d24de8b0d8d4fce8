// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between a directory of images and a batch of
// tensors ready for the model.
//
//   class directories
//       │
//       ▼
//   ImageFolder         → lists (path, label) samples
//       │
//       ▼
//   splitter            → optional per-class validation subset
//       │
//       ▼
//   ImageFolderDataset  → implements Burn's Dataset trait
//       │
//       ▼
//   ImagePreprocessor   → decode, resize, rescale (lazily, per batch)
//       │
//       ▼
//   ImageBatcher        → stacks decoded images into tensors
//       │
//       ▼
//   ImageFlow           → endless shuffled sequence of batches

/// Scans a class-per-directory image tree
pub mod loader;

/// Decodes, resizes and rescales single images
pub mod preprocessor;

/// Implements Burn's Dataset trait over image samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Per-class training/validation split
pub mod splitter;

/// Endless batch sequences and the `load_train` entry point
pub mod flow;

#[cfg(test)]
pub mod test_utils;
