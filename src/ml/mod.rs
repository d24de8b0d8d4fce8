// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// Network definitions, compilation, the training loop and
// inference.
//
//   model.rs      - ImageClassifier trait, loss, accuracy and
//                   CompiledModel (model + Adam + history)
//
//   shallow.rs    - two-convolution network trained from scratch
//
//   resnet.rs     - ResNet-50 feature extractor
//
//   transfer.rs   - ResNet-50 backbone + dense head
//
//   trainer.rs    - train_model: fixed steps per epoch over
//                   endless batch sequences, then validation
//
//   inferencer.rs - Predictor: rebuilds a model from its
//                   checkpoint and classifies single images

/// Classifier trait, loss, metric and compilation
pub mod model;

/// Shallow CNN
pub mod shallow;

/// Bottleneck ResNet backbone
pub mod resnet;

/// Transfer network on top of the ResNet backbone
pub mod transfer;

/// Training loop with validation
pub mod trainer;

/// Inference from a saved checkpoint
pub mod inferencer;
