// Image classification with Burn: image-folder loading, two CNN
// variants, a training loop and checkpointed inference. The
// `fruit-classifier` binary in main.rs is a thin CLI over it.
#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod infra;
pub mod ml;
