// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the
// pipeline works with. Nothing in here touches Burn, the
// filesystem or an image decoder.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain data and the traits other layers implement

// One labelled image on disk
pub mod image_sample;

// Class name <-> label mapping
pub mod class_index;

// Input geometry, architecture and backend selection
pub mod input_shape;

// Core abstractions implemented by the data layer
pub mod traits;
