// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Persistence shared by training and inference:
//
//   checkpoint.rs - model weights (full-precision MessagePack
//                   record), TrainConfig and class names as JSON so
//                   inference can rebuild the model
//
//   metrics.rs    - per-epoch History and the CSV log written
//                   next to the checkpoint

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training history and metrics CSV logger
pub mod metrics;
